//! Directory client over the authorization API
//!
//! Requests are authenticated as a service user with a short HS256 token in
//! the `X-Magda-Session` header, signed with the shared JWT secret.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use url::Url;

use super::{DirectoryClient, DirectoryError, User};

/// Header the authorization API reads the service identity from
pub const SESSION_HEADER: &str = "X-Magda-Session";

/// Longest error body kept in `DirectoryError::Status`
const MAX_ERROR_BODY: usize = 200;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionClaims<'a> {
    user_id: &'a str,
    iat: i64,
}

/// HTTP implementation of `DirectoryClient`
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    jwt_secret: Option<String>,
    acting_user_id: Option<String>,
}

impl HttpDirectoryClient {
    /// Create a client for the API rooted at `base_url` (e.g. `http://auth-api/v0`)
    pub fn new(
        base_url: impl Into<String>,
        jwt_secret: Option<String>,
        acting_user_id: Option<String>,
    ) -> Result<Self, DirectoryError> {
        let base_url = base_url.into();
        let base_url = match Url::parse(&base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return Err(DirectoryError::BaseUrl(base_url)),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url,
            jwt_secret,
            acting_user_id,
        })
    }

    /// Base url followed by `segments`, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Service token, only when both secret and acting user are configured
    fn session_token(&self) -> Result<Option<String>, DirectoryError> {
        let (Some(secret), Some(user_id)) = (&self.jwt_secret, &self.acting_user_id) else {
            return Ok(None);
        };
        let claims = SessionClaims {
            user_id,
            iat: chrono::Utc::now().timestamp(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(Some(token))
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, DirectoryError> {
        let mut request = self.http.request(method, self.endpoint(segments));
        if let Some(token) = self.session_token()? {
            request = request.header(SESSION_HEADER, token);
        }
        Ok(request)
    }
}

async fn status_error(response: Response) -> DirectoryError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    DirectoryError::Status { status, body }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn lookup_user(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<User>, DirectoryError> {
        let response = self
            .request(Method::GET, &["private", "users", "lookup"])?
            .query(&[("source", source), ("sourceId", source_id)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(status_error(response).await),
        }
    }

    async fn create_user(&self, user: &User) -> Result<User, DirectoryError> {
        let response = self
            .request(Method::POST, &["private", "users"])?
            .json(user)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Err(DirectoryError::Conflict(format!(
                "{}/{}",
                user.source, user.source_id
            ))),
            status if status.is_success() => {
                let created: User = response.json().await?;
                if created.id.is_none() {
                    return Err(DirectoryError::MissingId);
                }
                tracing::info!(
                    source = %created.source,
                    source_id = %created.source_id,
                    "Created directory user"
                );
                Ok(created)
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn add_user_roles(
        &self,
        user_id: &str,
        role_ids: &[String],
    ) -> Result<Vec<String>, DirectoryError> {
        let response = self
            .request(Method::POST, &["auth", "users", user_id, "roles"])?
            .json(role_ids)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(user_id.to_string())),
            status if status.is_success() => Ok(response.json().await?),
            _ => Err(status_error(response).await),
        }
    }
}
