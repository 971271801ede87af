use anyhow::Result;
use auth_plugin_sdk::directory::{
    DirectoryClient, DirectoryError, HttpDirectoryClient, User, SESSION_HEADER,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWT_SECRET: &str = "directory-test-secret";
const ACTING_USER: &str = "00000000-0000-4000-8000-000000000000";

fn client(server: &MockServer) -> HttpDirectoryClient {
    HttpDirectoryClient::new(
        format!("{}/v0", server.uri()),
        Some(JWT_SECRET.to_string()),
        Some(ACTING_USER.to_string()),
    )
    .unwrap()
}

fn candidate() -> User {
    User {
        id: None,
        display_name: "A".to_string(),
        email: "a@x.com".to_string(),
        photo_url: Some("https://photos.example/a.png".to_string()),
        source: "google".to_string(),
        source_id: "u1".to_string(),
        is_admin: false,
        org_unit_id: None,
    }
}

#[tokio::test]
async fn test_lookup_found_and_missing() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/private/users/lookup"))
        .and(query_param("source", "google"))
        .and(query_param("sourceId", "u1"))
        .and(header_exists(SESSION_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "displayName": "A",
            "email": "a@x.com",
            "source": "google",
            "sourceId": "u1",
            "isAdmin": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/private/users/lookup"))
        .and(query_param("sourceId", "nobody"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    let found = client.lookup_user("google", "u1").await?;
    assert_eq!(found.and_then(|u| u.id).as_deref(), Some("user-1"));
    assert!(client.lookup_user("google", "nobody").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_service_token_identifies_acting_user() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client(&server).lookup_user("google", "u1").await?;

    let requests = server.received_requests().await.unwrap_or_default();
    let token = requests[0]
        .headers
        .get(SESSION_HEADER)
        .expect("service token header")
        .to_str()?;

    let mut validation = Validation::default();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let claims = decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &validation,
    )?
    .claims;
    assert_eq!(claims["userId"], ACTING_USER);
    Ok(())
}

#[tokio::test]
async fn test_create_user_posts_camel_case_record() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/private/users"))
        .and(body_json(json!({
            "displayName": "A",
            "email": "a@x.com",
            "photoURL": "https://photos.example/a.png",
            "source": "google",
            "sourceId": "u1",
            "isAdmin": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "displayName": "A",
            "email": "a@x.com",
            "photoURL": "https://photos.example/a.png",
            "source": "google",
            "sourceId": "u1",
            "isAdmin": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server).create_user(&candidate()).await?;
    assert_eq!(created.id.as_deref(), Some("user-1"));
    Ok(())
}

#[tokio::test]
async fn test_create_conflict_and_server_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/private/users"))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v0/private/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(1000)))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(
        client.create_user(&candidate()).await,
        Err(DirectoryError::Conflict(_))
    ));
    match client.create_user(&candidate()).await {
        Err(DirectoryError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), 200);
        }
        other => panic!("expected status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_add_user_roles() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/auth/users/user-1/roles"))
        .and(body_json(json!(["role-a", "role-b"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["assignment-1", "assignment-2"])))
        .expect(1)
        .mount(&server)
        .await;

    let ids = client(&server)
        .add_user_roles("user-1", &["role-a".to_string(), "role-b".to_string()])
        .await?;
    assert_eq!(ids, vec!["assignment-1", "assignment-2"]);
    Ok(())
}
