//! Storage collaborators used by the note and tag logic.

pub mod memory;
pub mod sqlite;

use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Note, Tag};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no active session")]
    Authentication,
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Network(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("record".to_string()),
            other => StoreError::Network(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save(
        &self,
        owner_id: &str,
        note_id: Option<&str>,
        content: &str,
    ) -> Result<Note, StoreError>;

    async fn get(&self, owner_id: &str, note_id: &str) -> Result<Note, StoreError>;

    async fn delete(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError>;

    /// Newest first. When `tag` is set only notes carrying a tag with exactly
    /// that name are returned.
    async fn list_for_owner(
        &self,
        owner_id: &str,
        tag: Option<&str>,
    ) -> Result<Vec<Note>, StoreError>;

    async fn created_since(&self, owner_id: &str, since: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Tag>, StoreError>;

    async fn list_for_note(&self, note_id: &str) -> Result<Vec<Tag>, StoreError>;

    /// Fails with [`StoreError::Validation`] when the trimmed name is empty.
    async fn create(&self, owner_id: &str, name: &str) -> Result<Tag, StoreError>;

    /// Fails with [`StoreError::NotFound`] when either id is unknown.
    /// Associating an already associated pair is a no-op.
    async fn associate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError>;

    async fn disassociate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError>;
}

pub trait SessionProvider: Send + Sync {
    fn current_owner_id(&self) -> Result<String, StoreError>;
}

#[derive(Debug, Default)]
pub struct OwnerSession {
    owner_id: RwLock<Option<String>>,
}

impl OwnerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: RwLock::new(Some(owner_id.into())),
        }
    }

    pub fn login(&self, owner_id: impl Into<String>) {
        let mut guard = self.owner_id.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(owner_id.into());
    }

    pub fn logout(&self) {
        let mut guard = self.owner_id.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl SessionProvider for OwnerSession {
    fn current_owner_id(&self) -> Result<String, StoreError> {
        self.owner_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StoreError::Authentication)
    }
}

pub(crate) fn validate_tag_name(name: &str) -> Result<&str, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("tag name cannot be empty".to_string()));
    }
    Ok(name)
}
