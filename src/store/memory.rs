use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{validate_tag_name, ContentStore, StoreError, TagStore};
use crate::models::{Note, NoteTag, Tag};

#[derive(Default)]
struct State {
    notes: Vec<Note>,
    tags: Vec<Tag>,
    links: HashSet<NoteTag>,
}

/// Process-local store. Notes are kept in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn association_count(&self) -> usize {
        self.state.lock().await.links.len()
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn save(
        &self,
        owner_id: &str,
        note_id: Option<&str>,
        content: &str,
    ) -> Result<Note, StoreError> {
        let mut state = self.state.lock().await;

        let Some(note_id) = note_id else {
            let note = Note::new(owner_id.to_string(), content.to_string());
            state.notes.push(note.clone());
            return Ok(note);
        };

        let note = state
            .notes
            .iter_mut()
            .find(|n| n.id == note_id && n.user_id == owner_id)
            .ok_or_else(|| StoreError::NotFound(format!("note {note_id}")))?;
        note.content = content.to_string();
        note.updated_at = Utc::now().to_rfc3339();
        Ok(note.clone())
    }

    async fn get(&self, owner_id: &str, note_id: &str) -> Result<Note, StoreError> {
        let state = self.state.lock().await;
        state
            .notes
            .iter()
            .find(|n| n.id == note_id && n.user_id == owner_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("note {note_id}")))
    }

    async fn delete(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let before = state.notes.len();
        state
            .notes
            .retain(|n| !(n.id == note_id && n.user_id == owner_id));
        if state.notes.len() == before {
            return Err(StoreError::NotFound(format!("note {note_id}")));
        }
        state.links.retain(|link| link.note_id != note_id);
        Ok(())
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        tag: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        let state = self.state.lock().await;
        let tagged: Option<HashSet<&str>> = tag.map(|name| {
            state
                .tags
                .iter()
                .filter(|t| t.name == name)
                .map(|t| t.id.as_str())
                .collect()
        });

        Ok(state
            .notes
            .iter()
            .rev()
            .filter(|n| n.user_id == owner_id)
            .filter(|n| match &tagged {
                None => true,
                Some(ids) => state
                    .links
                    .iter()
                    .any(|link| link.note_id == n.id && ids.contains(link.tag_id.as_str())),
            })
            .cloned()
            .collect())
    }

    async fn created_since(&self, owner_id: &str, since: &str) -> Result<Vec<String>, StoreError> {
        let since = parse_timestamp(since)
            .ok_or_else(|| StoreError::Validation(format!("bad timestamp {since}")))?;
        let state = self.state.lock().await;
        Ok(state
            .notes
            .iter()
            .filter(|n| n.user_id == owner_id)
            .filter(|n| parse_timestamp(&n.created_at).is_some_and(|at| at >= since))
            .map(|n| n.created_at.clone())
            .collect())
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Tag>, StoreError> {
        let state = self.state.lock().await;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn list_for_note(&self, note_id: &str) -> Result<Vec<Tag>, StoreError> {
        let state = self.state.lock().await;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|t| {
                state.links.contains(&NoteTag {
                    note_id: note_id.to_string(),
                    tag_id: t.id.clone(),
                })
            })
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create(&self, owner_id: &str, name: &str) -> Result<Tag, StoreError> {
        let name = validate_tag_name(name)?;
        let tag = Tag::new(owner_id.to_string(), name);
        self.state.lock().await.tags.push(tag.clone());
        Ok(tag)
    }

    async fn associate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.notes.iter().any(|n| n.id == note_id) {
            return Err(StoreError::NotFound(format!("note {note_id}")));
        }
        if !state.tags.iter().any(|t| t.id == tag_id) {
            return Err(StoreError::NotFound(format!("tag {tag_id}")));
        }
        state.links.insert(NoteTag {
            note_id: note_id.to_string(),
            tag_id: tag_id.to_string(),
        });
        Ok(())
    }

    async fn disassociate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
        self.state.lock().await.links.remove(&NoteTag {
            note_id: note_id.to_string(),
            tag_id: tag_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_creates_then_updates() {
        let store = MemoryStore::new();
        let note = store.save("owner", None, "<p>first</p>").await.unwrap();

        let updated = store
            .save("owner", Some(&note.id), "<p>second</p>")
            .await
            .unwrap();
        assert_eq!(updated.id, note.id);
        assert_eq!(updated.content, "<p>second</p>");

        let err = store
            .save("someone-else", Some(&note.id), "<p>x</p>")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn associate_requires_known_ids_and_is_idempotent() {
        let store = MemoryStore::new();
        let note = store.save("owner", None, "hi").await.unwrap();
        let tag = store.create("owner", "work").await.unwrap();

        assert!(matches!(
            store.associate("missing", &tag.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.associate(&note.id, "missing").await,
            Err(StoreError::NotFound(_))
        ));

        store.associate(&note.id, &tag.id).await.unwrap();
        store.associate(&note.id, &tag.id).await.unwrap();
        assert_eq!(store.association_count().await, 1);

        store.disassociate(&note.id, &tag.id).await.unwrap();
        store.disassociate(&note.id, &tag.id).await.unwrap();
        assert_eq!(store.association_count().await, 0);
    }

    #[tokio::test]
    async fn list_filters_by_tag_newest_first() {
        let store = MemoryStore::new();
        let first = store.save("owner", None, "one").await.unwrap();
        let second = store.save("owner", None, "two").await.unwrap();
        store.save("other", None, "not mine").await.unwrap();
        let tag = store.create("owner", "life").await.unwrap();
        store.associate(&first.id, &tag.id).await.unwrap();

        let all = ContentStore::list_for_owner(&store, "owner", None).await.unwrap();
        assert_eq!(
            all.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec![second.id.as_str(), first.id.as_str()]
        );

        let tagged = ContentStore::list_for_owner(&store, "owner", Some("life"))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, first.id);
    }

    #[tokio::test]
    async fn deleting_a_note_keeps_its_tags() {
        let store = MemoryStore::new();
        let note = store.save("owner", None, "bye").await.unwrap();
        let tag = store.create("owner", "orphan").await.unwrap();
        store.associate(&note.id, &tag.id).await.unwrap();

        store.delete("owner", &note.id).await.unwrap();

        assert_eq!(store.association_count().await, 0);
        let tags = TagStore::list_for_owner(&store, "owner").await.unwrap();
        assert_eq!(tags.len(), 1);
    }
}
