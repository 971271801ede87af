//! Provider login cycle
//!
//! `initiate` sends the user agent to the identity provider with the
//! post-login target as opaque state. `complete` handles the provider's
//! callback: it authenticates, links the identity, writes the principal to
//! the session store and computes the final redirect. Every failure on the
//! callback side becomes a failure redirect.

mod routes;
mod state;

pub use routes::login_routes;
pub use state::{LoginCycle, LoginState};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::AuthError;
use crate::identity::{ExternalProfile, NoSessionExtension, Principal, SessionExtension};
use crate::linker::IdentityLinker;
use crate::redirect::{append_outcome, Outcome, RedirectPolicy};
use crate::session::Session;

/// Query parameters the provider sends back to the callback path
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    /// Echoed post-login target
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Handshake with one identity provider
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Source tag stored on linked users, e.g. "google"
    fn source(&self) -> &str;

    fn scopes(&self) -> &[String];

    /// Provider authorization URL carrying `state` unmodified
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError>;

    /// Verify the callback artifacts and fetch the profile
    async fn authenticate(&self, params: &CallbackParams) -> Result<ExternalProfile, AuthError>;
}

pub struct LoginFlow {
    strategy: Arc<dyn ProviderStrategy>,
    linker: IdentityLinker,
    redirect: RedirectPolicy,
    extension: Arc<dyn SessionExtension>,
}

impl LoginFlow {
    pub fn new(
        strategy: Arc<dyn ProviderStrategy>,
        linker: IdentityLinker,
        redirect: RedirectPolicy,
    ) -> Self {
        Self {
            strategy,
            linker,
            redirect,
            extension: Arc::new(NoSessionExtension),
        }
    }

    #[must_use]
    pub fn with_session_extension(mut self, extension: Arc<dyn SessionExtension>) -> Self {
        self.extension = extension;
        self
    }

    pub fn source(&self) -> &str {
        self.strategy.source()
    }

    /// Provider URL to send the user agent to
    pub fn initiate(&self, requested_redirect: Option<&str>) -> Result<Url, AuthError> {
        let mut cycle = LoginCycle::start(self.source());
        cycle.advance(LoginState::Initiating);

        let attempt = self
            .redirect
            .initial_target(requested_redirect)
            .map_err(AuthError::from)
            .and_then(|target| self.strategy.authorize_url(&target));

        match attempt {
            Ok(url) => {
                cycle.advance(LoginState::AwaitingProvider);
                tracing::debug!(
                    source = self.source(),
                    scopes = ?self.strategy.scopes(),
                    "Redirecting to identity provider"
                );
                Ok(url)
            }
            Err(e) => {
                cycle.advance(LoginState::Failed);
                Err(e)
            }
        }
    }

    /// Final redirect target for a provider callback
    pub async fn complete(&self, params: &CallbackParams, session: &Session) -> String {
        let mut cycle = LoginCycle::resume(self.source());
        cycle.advance(LoginState::Returned);

        let target = self.redirect.revalidate(params.state.as_deref());

        match self.link(params, session).await {
            Ok(principal) => {
                cycle.advance(LoginState::Succeeded);
                tracing::info!(source = self.source(), user_id = %principal.id, "Login succeeded");
                self.signal(&target, Outcome::Success, None)
            }
            Err(e) => {
                cycle.advance(LoginState::Failed);
                tracing::warn!(source = self.source(), error = %e, "Login failed");
                self.signal(&target, Outcome::Failure, Some(e.user_message()))
            }
        }
    }

    async fn link(&self, params: &CallbackParams, session: &Session) -> Result<Principal, AuthError> {
        if let Some(error) = &params.error {
            let detail = params.error_description.as_deref().unwrap_or(error);
            return Err(AuthError::Provider(detail.to_string()));
        }

        let profile = self.strategy.authenticate(params).await?;
        let mut principal = self.linker.resolve(&profile, self.source()).await?;
        principal.session = self.extension.extend(&profile);
        session.login(&principal)?;
        if let Err(e) = session.persist().await {
            session.discard();
            return Err(e.into());
        }
        Ok(principal)
    }

    fn signal(&self, target: &str, outcome: Outcome, error_message: Option<&str>) -> String {
        append_outcome(target, outcome, error_message)
            .or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default redirect target");
                append_outcome(self.redirect.default_target(), outcome, error_message)
            })
            .unwrap_or_else(|_| self.redirect.default_target().to_string())
    }
}
