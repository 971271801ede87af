//! Google provider handshake
//!
//! Authorization code flow via `oauth2`, then the OpenID userinfo endpoint
//! for the profile. The post-login target rides in `state` untouched; the
//! login flow re-validates it on return.

use std::time::Duration;

use async_trait::async_trait;
use auth_plugin_sdk::{AuthError, CallbackParams, ExternalProfile, ProviderStrategy};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use url::Url;

use crate::config::GoogleConfig;

/// Source tag for users linked through Google
pub const SOURCE: &str = "google";

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OpenID userinfo response
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

pub struct GoogleStrategy {
    client: GoogleClient,
    http_client: reqwest::Client,
    userinfo_url: String,
    scopes: Vec<String>,
}

/// Where Google sends the user agent back to
pub fn callback_url(external_url: &str) -> String {
    format!(
        "{}/auth/login/plugin/{SOURCE}/return",
        external_url.trim_end_matches('/')
    )
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, AuthError> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Config(format!("Google {name} is not configured")))
}

fn invalid_url(name: &str, e: url::ParseError) -> AuthError {
    AuthError::Config(format!("invalid Google {name}: {e}"))
}

impl GoogleStrategy {
    /// Fails with `AuthError::Config` when credentials or endpoints are unusable
    pub fn new(config: &GoogleConfig, external_url: &str) -> Result<Self, AuthError> {
        let client_id = required(config.client_id.as_ref(), "client id")?;
        let client_secret = required(config.client_secret.as_ref(), "client secret")?;

        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone()).map_err(|e| invalid_url("auth url", e))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone()).map_err(|e| invalid_url("token url", e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(callback_url(external_url))
                    .map_err(|e| invalid_url("callback url", e))?,
            );

        // Token endpoints must not redirect (SSRF)
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            http_client,
            userinfo_url: config.userinfo_url.clone(),
            scopes: vec!["profile".to_string(), "email".to_string()],
        })
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "userinfo request failed with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid userinfo response: {e}")))
    }
}

impl From<UserInfo> for ExternalProfile {
    fn from(info: UserInfo) -> Self {
        let raw = serde_json::json!({
            "sub": info.sub,
            "name": info.name,
            "email": info.email,
            "picture": info.picture,
        });
        Self {
            display_name: info.name.unwrap_or_default(),
            emails: info.email.into_iter().collect(),
            photos: info.picture.into_iter().collect(),
            id: info.sub,
            raw,
        }
    }
}

#[async_trait]
impl ProviderStrategy for GoogleStrategy {
    fn source(&self) -> &str {
        SOURCE
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        let state = state.to_string();
        let (url, _state) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();
        Ok(url)
    }

    async fn authenticate(&self, params: &CallbackParams) -> Result<ExternalProfile, AuthError> {
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::Provider("callback carries no authorization code".to_string()))?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::Provider(format!("token exchange failed: {e}")))?;

        let info = self.fetch_userinfo(token.access_token().secret()).await?;
        tracing::debug!(sub = %info.sub, "Fetched Google profile");
        Ok(info.into())
    }
}
