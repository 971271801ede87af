use anyhow::Result;
use auth_plugin_google::config::GoogleConfig;
use auth_plugin_google::GoogleStrategy;
use auth_plugin_sdk::{AuthError, CallbackParams, ProviderStrategy};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn strategy(server: &MockServer) -> GoogleStrategy {
    let config = GoogleConfig {
        client_id: Some("client-123".to_string()),
        client_secret: Some("shh".to_string()),
        auth_url: format!("{}/o/oauth2/v2/auth", server.uri()),
        token_url: format!("{}/token", server.uri()),
        userinfo_url: format!("{}/v1/userinfo", server.uri()),
    };
    GoogleStrategy::new(&config, "http://localhost:6100").unwrap()
}

fn callback(code: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some("http://localhost:6100/sign-in-redirect".to_string()),
        ..CallbackParams::default()
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-abc",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_code_exchange_and_userinfo() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/userinfo"))
        .and(header("authorization", "Bearer access-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "10769150350006150715113082367",
            "name": "Alice Example",
            "email": "alice@example.com",
            "email_verified": true,
            "picture": "https://lh3.googleusercontent.com/a/photo.jpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = strategy(&server).authenticate(&callback("auth-code")).await?;

    assert_eq!(profile.id, "10769150350006150715113082367");
    assert_eq!(profile.display_name, "Alice Example");
    assert_eq!(profile.emails, vec!["alice@example.com"]);
    assert_eq!(profile.photos.len(), 1);
    assert_eq!(profile.raw["sub"], "10769150350006150715113082367");
    Ok(())
}

#[tokio::test]
async fn test_rejected_code_is_provider_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .mount(&server)
        .await;

    let result = strategy(&server).authenticate(&callback("stale-code")).await;
    assert!(matches!(result, Err(AuthError::Provider(_))));
    Ok(())
}

#[tokio::test]
async fn test_userinfo_failure_is_provider_error() -> Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/userinfo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = strategy(&server).authenticate(&callback("auth-code")).await;
    assert!(matches!(result, Err(AuthError::Provider(_))));
    Ok(())
}

#[tokio::test]
async fn test_missing_code_skips_token_endpoint() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let result = strategy(&server)
        .authenticate(&CallbackParams::default())
        .await;
    assert!(matches!(result, Err(AuthError::Provider(_))));
    Ok(())
}
