//! Directory service client
//!
//! The directory (authorization API) owns users and roles. Plugins only see
//! it through `DirectoryClient`: lookup by external identity, create, and
//! role assignment.

mod rest;
mod memory;

pub use rest::{HttpDirectoryClient, SESSION_HEADER};
pub use memory::MemoryDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Directory representation of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Generated by the directory on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub display_name: String,
    pub email: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub source: String,
    pub source_id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_unit_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// A user with the same external identity already exists
    #[error("user already exists: {0}")]
    Conflict(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("failed to sign service token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("directory returned a user without an id")]
    MissingId,

    #[error("invalid directory base url: {0}")]
    BaseUrl(String),
}

/// Narrow view of the directory service used by plugins
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Find the user linked to `(source, source_id)`; absence is not an error
    async fn lookup_user(&self, source: &str, source_id: &str)
        -> Result<Option<User>, DirectoryError>;

    /// Persist a new user and return it with its generated id
    async fn create_user(&self, user: &User) -> Result<User, DirectoryError>;

    /// Attach roles to a user, returning the role assignment ids
    async fn add_user_roles(
        &self,
        user_id: &str,
        role_ids: &[String],
    ) -> Result<Vec<String>, DirectoryError>;
}
