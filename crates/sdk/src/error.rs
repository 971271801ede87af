//! Error taxonomy for a login cycle
//!
//! Everything raised after control has left for the identity provider is
//! turned into a failure redirect by the flow; `user_message` is the only
//! text that reaches the front end.

use crate::directory::DirectoryError;
use crate::redirect::RedirectError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or malformed configuration detected before serving
    #[error("configuration error: {0}")]
    Config(String),

    /// External profile cannot be linked (no email address)
    #[error("User with no email address")]
    ProfileInvalid,

    /// Directory service unreachable or rejected the request
    #[error("directory service error: {0}")]
    Directory(#[from] DirectoryError),

    /// Provider handshake failed or was denied
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Pre- or post-create hook failed
    #[error("user hook failed: {0}")]
    Hook(anyhow::Error),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Caller-supplied URL could not be parsed
    #[error("invalid redirect target: {0}")]
    Redirect(#[from] RedirectError),
}

impl AuthError {
    /// Short message safe to hand to the front end in `errorMessage`
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Config(_) => "Authentication is not configured",
            Self::ProfileInvalid => "User with no email address",
            Self::Directory(_) => "Failed to retrieve or create the user account",
            Self::Provider(_) => "Authentication with the identity provider failed",
            Self::Hook(_) => "Failed to complete the user account setup",
            Self::Session(_) => "Failed to establish a session",
            Self::Redirect(_) => "Invalid redirect target",
        }
    }
}
