//! Identity linking
//!
//! Resolves an external profile to an internal user by lookup-or-create.
//! Hooks only run on first-time creation; a returning identity resolves to
//! the same user without touching them.

use std::sync::Arc;

use crate::directory::{DirectoryClient, DirectoryError, User};
use crate::error::AuthError;
use crate::hooks::{NoopHook, PostCreationHook, UserEnrichmentHook};
use crate::identity::{ExternalProfile, Principal};

/// Build the candidate record for a first-time login
fn profile_to_user(profile: &ExternalProfile, source: &str) -> Result<User, AuthError> {
    let email = profile.primary_email().ok_or(AuthError::ProfileInvalid)?;

    Ok(User {
        id: None,
        display_name: profile.display_name.clone(),
        email: email.to_string(),
        photo_url: profile.photos.first().cloned(),
        source: source.to_string(),
        source_id: profile.id.clone(),
        is_admin: false,
        org_unit_id: None,
    })
}

fn user_to_principal(user: &User) -> Result<Principal, AuthError> {
    let id = user.id.as_ref().ok_or(DirectoryError::MissingId)?;
    Ok(Principal::new(id.clone()))
}

/// Lookup-or-create for `(source, profile.id)`.
///
/// A profile without email fails before any directory call. When creation
/// reports a conflict (a concurrent first login won the race) the lookup is
/// retried once and the existing user is used without running hooks.
pub async fn create_or_get_principal(
    directory: &dyn DirectoryClient,
    profile: &ExternalProfile,
    source: &str,
    pre_create: Option<&dyn UserEnrichmentHook>,
    post_create: Option<&dyn PostCreationHook>,
) -> Result<Principal, AuthError> {
    let candidate = profile_to_user(profile, source)?;

    if let Some(existing) = directory.lookup_user(source, &profile.id).await? {
        tracing::debug!(source, source_id = %profile.id, "Linked returning user");
        return user_to_principal(&existing);
    }

    let candidate = match pre_create {
        Some(hook) => {
            let enriched = hook
                .before_create(directory, candidate.clone(), profile)
                .await
                .map_err(AuthError::Hook)?;
            if enriched.source != candidate.source || enriched.source_id != candidate.source_id {
                return Err(AuthError::Hook(anyhow::anyhow!(
                    "pre-create hook changed the user's source identity"
                )));
            }
            enriched
        }
        None => candidate,
    };

    let created = match directory.create_user(&candidate).await {
        Ok(created) => created,
        Err(DirectoryError::Conflict(key)) => {
            tracing::warn!(%key, "User created concurrently, retrying lookup");
            return match directory.lookup_user(source, &profile.id).await? {
                Some(existing) => user_to_principal(&existing),
                None => Err(DirectoryError::Conflict(key).into()),
            };
        }
        Err(e) => return Err(e.into()),
    };

    let principal = user_to_principal(&created)?;
    tracing::info!(source, source_id = %profile.id, user_id = %principal.id, "Linked new user");

    // The user stays in place if this fails.
    if let Some(hook) = post_create {
        hook.after_create(directory, &created, profile)
            .await
            .map_err(AuthError::Hook)?;
    }

    Ok(principal)
}

/// Directory client plus the deployment's hooks
#[derive(Clone)]
pub struct IdentityLinker {
    directory: Arc<dyn DirectoryClient>,
    pre_create: Arc<dyn UserEnrichmentHook>,
    post_create: Arc<dyn PostCreationHook>,
}

impl IdentityLinker {
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            directory,
            pre_create: Arc::new(NoopHook),
            post_create: Arc::new(NoopHook),
        }
    }

    #[must_use]
    pub fn with_pre_create_hook(mut self, hook: Arc<dyn UserEnrichmentHook>) -> Self {
        self.pre_create = hook;
        self
    }

    #[must_use]
    pub fn with_post_create_hook(mut self, hook: Arc<dyn PostCreationHook>) -> Self {
        self.post_create = hook;
        self
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryClient> {
        &self.directory
    }

    /// Resolve a profile from `source` to a bare principal
    pub async fn resolve(
        &self,
        profile: &ExternalProfile,
        source: &str,
    ) -> Result<Principal, AuthError> {
        create_or_get_principal(
            self.directory.as_ref(),
            profile,
            source,
            Some(self.pre_create.as_ref()),
            Some(self.post_create.as_ref()),
        )
        .await
    }
}
