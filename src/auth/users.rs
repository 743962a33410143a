//! User-record lookup.
//!
//! The pipeline does not own user persistence. It consumes a `UserStore` and
//! only ever reads from it. `InMemoryUserStore` backs the binary and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::auth::error::StoreError;

/// Account role carried in identity claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => f.write_str("customer"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

/// A user as seen by the security pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
}

/// Read-only access to user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// A thread-safe in-process user store.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    by_id: Arc<DashMap<String, UserRecord>>,
    /// Lowercased email -> id.
    email_index: Arc<DashMap<String, String>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a JSON array file.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let store = Self::new();
        let file = File::open(path)?;
        let records: Vec<UserRecord> = serde_json::from_reader(BufReader::new(file))?;
        for record in records {
            store.insert(record);
        }
        tracing::info!(count = store.len(), "Loaded user records");
        Ok(store)
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: UserRecord) {
        if let Some(previous) = self.by_id.get(&record.id) {
            self.email_index.remove(&previous.email.to_lowercase());
        }
        self.email_index
            .insert(record.email.to_lowercase(), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    /// Flip the active flag. Returns false if the user does not exist.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        match self.by_id.get_mut(id) {
            Some(mut record) => {
                record.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) {
        if let Some((_, record)) = self.by_id.remove(id) {
            self.email_index.remove(&record.email.to_lowercase());
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let id = match self.email_index.get(&email.trim().to_lowercase()) {
            Some(id) => id.value().clone(),
            None => return Ok(None),
        };
        Ok(self.by_id.get(&id).map(|r| r.value().clone()))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.by_id.get(id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, email: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            role: Role::Customer,
            is_active: true,
            is_verified: true,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_email_is_case_insensitive() {
        let store = InMemoryUserStore::new();
        store.insert(record("u1", "Jane@Example.com"));

        let found = store.find_user_by_email("jane@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, "u1");
        assert!(store.find_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_active_and_remove() {
        let store = InMemoryUserStore::new();
        store.insert(record("u1", "a@example.com"));

        assert!(store.set_active("u1", false));
        assert!(!store.find_user_by_id("u1").await.unwrap().unwrap().is_active);
        assert!(!store.set_active("missing", false));

        store.remove("u1");
        assert!(store.is_empty());
        assert!(store.find_user_by_email("a@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_email_change_drops_old_index() {
        let store = InMemoryUserStore::new();
        store.insert(record("u1", "old@example.com"));
        store.insert(record("u1", "new@example.com"));

        assert!(store.find_user_by_email("old@example.com").await.unwrap().is_none());
        assert!(store.find_user_by_email("new@example.com").await.unwrap().is_some());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("hearth_guard_users_test.json");
        let records = vec![record("u1", "a@example.com"), record("u2", "b@example.com")];
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let store = InMemoryUserStore::load_from_file(&path).unwrap();
        assert_eq!(store.len(), 2);

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
