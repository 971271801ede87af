//! In-memory directory for tests and local development
//!
//! Users live in a map keyed by generated id and are lost on drop. Call
//! counters let tests assert how the directory was used.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{DirectoryClient, DirectoryError, User};

#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, User>>,
    roles: RwLock<HashMap<String, Vec<String>>>,
    lookups: AtomicUsize,
    creates: AtomicUsize,
    role_calls: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with existing users; users without an id get one
    pub fn with_users(users: Vec<User>) -> Self {
        let directory = Self::new();
        {
            let mut map = directory
                .users
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for mut user in users {
                let id = user.id.clone().unwrap_or_else(generate_user_id);
                user.id = Some(id.clone());
                map.insert(id, user);
            }
        }
        directory
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn role_calls(&self) -> usize {
        self.role_calls.load(Ordering::SeqCst)
    }

    /// Total directory calls of any kind
    pub fn total_calls(&self) -> usize {
        self.lookup_calls() + self.create_calls() + self.role_calls()
    }

    pub fn user_count(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Role ids attached to a user
    pub fn roles_of(&self, user_id: &str) -> Vec<String> {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn find(&self, source: &str, source_id: &str) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|u| u.source == source && u.source_id == source_id)
            .cloned()
    }
}

fn generate_user_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn lookup_user(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<User>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.find(source, source_id))
    }

    async fn create_user(&self, user: &User) -> Result<User, DirectoryError> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users
            .values()
            .any(|u| u.source == user.source && u.source_id == user.source_id)
        {
            return Err(DirectoryError::Conflict(format!(
                "{}/{}",
                user.source, user.source_id
            )));
        }

        let id = generate_user_id();
        let created = User {
            id: Some(id.clone()),
            ..user.clone()
        };
        users.insert(id, created.clone());
        Ok(created)
    }

    async fn add_user_roles(
        &self,
        user_id: &str,
        role_ids: &[String],
    ) -> Result<Vec<String>, DirectoryError> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);

        if self.user(user_id).is_none() {
            return Err(DirectoryError::NotFound(user_id.to_string()));
        }

        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        let assigned = roles.entry(user_id.to_string()).or_default();
        let mut assignment_ids = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            if !assigned.contains(role_id) {
                assigned.push(role_id.clone());
            }
            assignment_ids.push(format!("{user_id}:{role_id}"));
        }
        Ok(assignment_ids)
    }
}
