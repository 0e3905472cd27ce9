use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: String,
}

impl Tag {
    /// Names keep the case they were typed in; only surrounding whitespace is dropped.
    pub fn new(owner_id: String, name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            name: name.trim().to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct NoteTag {
    pub note_id: String,
    pub tag_id: String,
}
