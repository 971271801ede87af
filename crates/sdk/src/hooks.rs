//! Extension hooks around first-time user creation
//!
//! Hooks are owned by the deployment and injected into the linker at
//! construction. A failing hook aborts the login.

use async_trait::async_trait;

use crate::directory::{DirectoryClient, User};
use crate::identity::ExternalProfile;

/// Runs before a new user is persisted; may add fields to the candidate
#[async_trait]
pub trait UserEnrichmentHook: Send + Sync {
    async fn before_create(
        &self,
        directory: &dyn DirectoryClient,
        candidate: User,
        profile: &ExternalProfile,
    ) -> anyhow::Result<User>;
}

/// Runs after a new user is persisted, e.g. to attach roles
#[async_trait]
pub trait PostCreationHook: Send + Sync {
    async fn after_create(
        &self,
        directory: &dyn DirectoryClient,
        user: &User,
        profile: &ExternalProfile,
    ) -> anyhow::Result<()>;
}

/// Default for both hook points
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl UserEnrichmentHook for NoopHook {
    async fn before_create(
        &self,
        _directory: &dyn DirectoryClient,
        candidate: User,
        _profile: &ExternalProfile,
    ) -> anyhow::Result<User> {
        Ok(candidate)
    }
}

#[async_trait]
impl PostCreationHook for NoopHook {
    async fn after_create(
        &self,
        _directory: &dyn DirectoryClient,
        _user: &User,
        _profile: &ExternalProfile,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Places every new user into a fixed organizational unit
#[derive(Debug, Clone)]
pub struct AssignOrgUnit {
    org_unit_id: String,
}

impl AssignOrgUnit {
    pub fn new(org_unit_id: impl Into<String>) -> Self {
        Self {
            org_unit_id: org_unit_id.into(),
        }
    }
}

#[async_trait]
impl UserEnrichmentHook for AssignOrgUnit {
    async fn before_create(
        &self,
        _directory: &dyn DirectoryClient,
        candidate: User,
        _profile: &ExternalProfile,
    ) -> anyhow::Result<User> {
        Ok(User {
            org_unit_id: Some(self.org_unit_id.clone()),
            ..candidate
        })
    }
}

/// Attaches a fixed set of roles to every new user
#[derive(Debug, Clone)]
pub struct AssignRoles {
    role_ids: Vec<String>,
}

impl AssignRoles {
    pub fn new(role_ids: Vec<String>) -> Self {
        Self { role_ids }
    }
}

#[async_trait]
impl PostCreationHook for AssignRoles {
    async fn after_create(
        &self,
        directory: &dyn DirectoryClient,
        user: &User,
        _profile: &ExternalProfile,
    ) -> anyhow::Result<()> {
        if self.role_ids.is_empty() {
            return Ok(());
        }
        let user_id = user
            .id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("created user has no id"))?;
        directory.add_user_roles(user_id, &self.role_ids).await?;
        tracing::debug!(user_id, roles = ?self.role_ids, "Assigned default roles");
        Ok(())
    }
}
