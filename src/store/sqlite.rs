use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{validate_tag_name, ContentStore, StoreError, TagStore};
use crate::models::{Note, Tag};

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Every tag of the owner with the number of notes carrying it, by name.
    pub async fn tag_counts(&self, owner_id: &str) -> Result<Vec<(String, i64)>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT t.name, COUNT(nt.note_id) as count
            FROM tags t
            LEFT JOIN note_tags nt ON nt.tag_id = t.id
            WHERE t.owner_id = ?
            GROUP BY t.id
            ORDER BY t.name ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn note_exists(&self, note_id: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes WHERE id = ?")
            .bind(note_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count.0 > 0)
    }

    async fn tag_exists(&self, tag_id: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ?")
            .bind(tag_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count.0 > 0)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn save(
        &self,
        owner_id: &str,
        note_id: Option<&str>,
        content: &str,
    ) -> Result<Note, StoreError> {
        let Some(note_id) = note_id else {
            let note = Note::new(owner_id.to_string(), content.to_string());
            sqlx::query(
                "INSERT INTO notes (id, user_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&note.id)
            .bind(&note.user_id)
            .bind(&note.content)
            .bind(&note.created_at)
            .bind(&note.updated_at)
            .execute(&self.db)
            .await?;
            return Ok(note);
        };

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE notes SET content = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(content)
        .bind(&now)
        .bind(note_id)
        .bind(owner_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("note {note_id}")));
        }

        self.get(owner_id, note_id).await
    }

    async fn get(&self, owner_id: &str, note_id: &str) -> Result<Note, StoreError> {
        let note: Option<Note> = sqlx::query_as("SELECT * FROM notes WHERE id = ? AND user_id = ?")
            .bind(note_id)
            .bind(owner_id)
            .fetch_optional(&self.db)
            .await?;

        note.ok_or_else(|| StoreError::NotFound(format!("note {note_id}")))
    }

    async fn delete(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ? AND user_id = ?")
            .bind(note_id)
            .bind(owner_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("note {note_id}")));
        }
        Ok(())
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        tag: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        let notes: Vec<Note> = sqlx::query_as(
            r#"
            SELECT n.* FROM notes n
            WHERE n.user_id = ? AND (? IS NULL OR EXISTS (
                SELECT 1 FROM note_tags nt
                JOIN tags t ON t.id = nt.tag_id
                WHERE nt.note_id = n.id AND t.name = ?
            ))
            ORDER BY n.created_at DESC, n.rowid DESC
            "#,
        )
        .bind(owner_id)
        .bind(tag)
        .bind(tag)
        .fetch_all(&self.db)
        .await?;

        Ok(notes)
    }

    async fn created_since(&self, owner_id: &str, since: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT created_at FROM notes WHERE user_id = ? AND created_at >= ? ORDER BY created_at",
        )
        .bind(owner_id)
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(created_at,)| created_at).collect())
    }
}

#[async_trait]
impl TagStore for SqliteStore {
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Tag>, StoreError> {
        let tags: Vec<Tag> =
            sqlx::query_as("SELECT * FROM tags WHERE owner_id = ? ORDER BY name ASC, created_at ASC")
                .bind(owner_id)
                .fetch_all(&self.db)
                .await?;
        Ok(tags)
    }

    async fn list_for_note(&self, note_id: &str) -> Result<Vec<Tag>, StoreError> {
        let tags: Vec<Tag> = sqlx::query_as(
            "SELECT t.* FROM tags t JOIN note_tags nt ON nt.tag_id = t.id WHERE nt.note_id = ? ORDER BY t.name ASC",
        )
        .bind(note_id)
        .fetch_all(&self.db)
        .await?;
        Ok(tags)
    }

    async fn create(&self, owner_id: &str, name: &str) -> Result<Tag, StoreError> {
        let name = validate_tag_name(name)?;
        let tag = Tag::new(owner_id.to_string(), name);

        sqlx::query("INSERT INTO tags (id, owner_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&tag.id)
            .bind(&tag.owner_id)
            .bind(&tag.name)
            .bind(&tag.created_at)
            .execute(&self.db)
            .await?;

        Ok(tag)
    }

    async fn associate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
        if !self.note_exists(note_id).await? {
            return Err(StoreError::NotFound(format!("note {note_id}")));
        }
        if !self.tag_exists(tag_id).await? {
            return Err(StoreError::NotFound(format!("tag {tag_id}")));
        }

        sqlx::query("INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?, ?)")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn disassociate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM note_tags WHERE note_id = ? AND tag_id = ?")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
