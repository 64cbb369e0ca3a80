//! Authentication backend trait and in-memory implementation.
//! Credential checking is pluggable; the token flows only see its verdict.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Validate credentials. Returns the user's roles if they are valid.
    async fn authenticate(&self, username: &str, password: &str) -> Option<Vec<String>>;

    /// Current roles for a known user, `None` if the user no longer exists.
    async fn roles_for(&self, username: &str) -> Option<Vec<String>>;
}

#[derive(Debug, Clone)]
struct UserRecord {
    password: String,
    roles: Vec<String>,
}

/// In-memory user store for demo/testing
#[derive(Clone, Default)]
pub struct InMemoryAuthBackend {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str, roles: &[&str]) -> Self {
        self.insert_user(username, password, roles);
        self
    }

    pub fn insert_user(&self, username: &str, password: &str, roles: &[&str]) {
        let record = UserRecord {
            password: password.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string(), record);
    }

    pub fn remove_user(&self, username: &str) {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(username);
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn authenticate(&self, username: &str, password: &str) -> Option<Vec<String>> {
        let users = self.users.read().ok()?;
        users
            .get(username)
            .filter(|u| u.password == password)
            .map(|u| u.roles.clone())
    }

    async fn roles_for(&self, username: &str) -> Option<Vec<String>> {
        let users = self.users.read().ok()?;
        users.get(username).map(|u| u.roles.clone())
    }
}
