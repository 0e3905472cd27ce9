//! Note operations for one signed-in owner.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use thiserror::Error;

use crate::heatmap::{self, DayCount};
use crate::models::{Note, NoteWithTags, Tag};
use crate::reconcile::{strip_markup, AppliedTags, ReconcileError, TagEvents, TagReconciler};
use crate::store::{ContentStore, SessionProvider, StoreError, TagStore};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The content was stored but its tags could not be brought in line.
    #[error("note saved but tags were not updated: {source}")]
    Tags { note: Note, source: ReconcileError },
}

#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    pub search: Option<String>,
    pub tag: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug)]
pub struct NotePage {
    pub notes: Vec<NoteWithTags>,
    pub page: u32,
    pub total: usize,
    pub has_next: bool,
}

pub fn matches_search(content: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    term.is_empty() || strip_markup(content).to_lowercase().contains(&term)
}

pub struct Notebook {
    contents: Arc<dyn ContentStore>,
    tags: Arc<dyn TagStore>,
    session: Arc<dyn SessionProvider>,
    reconciler: TagReconciler,
}

impl Notebook {
    pub fn new(
        contents: Arc<dyn ContentStore>,
        tags: Arc<dyn TagStore>,
        session: Arc<dyn SessionProvider>,
        events: TagEvents,
    ) -> Self {
        let reconciler = TagReconciler::new(tags.clone(), session.clone(), events);
        Self {
            contents,
            tags,
            session,
            reconciler,
        }
    }

    /// Stores the content, then reconciles the note's tags with its hashtags.
    pub async fn save(&self, note_id: Option<&str>, content: &str) -> Result<(Note, AppliedTags), SaveError> {
        let owner_id = self.session.current_owner_id()?;
        if strip_markup(content).is_empty() {
            return Err(StoreError::Validation("note content cannot be empty".to_string()).into());
        }

        let note = self.contents.save(&owner_id, note_id, content).await?;
        tracing::info!(note_id = %note.id, created = note_id.is_none(), "saved note");

        match self.reconciler.sync_note(&note.id, &note.content).await {
            Ok(applied) => Ok((note, applied)),
            Err(source) => Err(SaveError::Tags { note, source }),
        }
    }

    pub async fn get(&self, note_id: &str) -> Result<NoteWithTags, StoreError> {
        let owner_id = self.session.current_owner_id()?;
        let note = self.contents.get(&owner_id, note_id).await?;
        let tags = self.tags.list_for_note(&note.id).await?;
        Ok(NoteWithTags { note, tags })
    }

    pub async fn delete(&self, note_id: &str) -> Result<(), StoreError> {
        let owner_id = self.session.current_owner_id()?;
        self.contents.delete(&owner_id, note_id).await?;
        tracing::info!(note_id, "deleted note");
        Ok(())
    }

    pub async fn list(&self, query: &NoteQuery) -> Result<NotePage, StoreError> {
        let owner_id = self.session.current_owner_id()?;
        let mut notes = self
            .contents
            .list_for_owner(&owner_id, query.tag.as_deref())
            .await?;

        if let Some(term) = query.search.as_deref() {
            notes.retain(|note| matches_search(&note.content, term));
        }

        let total = notes.len();
        let page = query.page.max(1);
        let page_size = query.page_size.max(1) as usize;
        let skip = (page as usize - 1) * page_size;

        let mut page_notes = Vec::new();
        for note in notes.into_iter().skip(skip).take(page_size) {
            let tags = self.tags.list_for_note(&note.id).await?;
            page_notes.push(NoteWithTags { note, tags });
        }

        Ok(NotePage {
            notes: page_notes,
            page,
            total,
            has_next: skip + page_size < total,
        })
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        let owner_id = self.session.current_owner_id()?;
        self.tags.list_for_owner(&owner_id).await
    }

    pub async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        let owner_id = self.session.current_owner_id()?;
        let name = name.trim();
        let existing = self.tags.list_for_owner(&owner_id).await?;
        if let Some(tag) = existing.into_iter().find(|t| t.name == name) {
            return Ok(tag);
        }
        let tag = self.tags.create(&owner_id, name).await?;
        tracing::info!(tag = %tag.name, "created tag");
        Ok(tag)
    }

    pub async fn set_tags(&self, note_id: &str, names: BTreeSet<String>) -> Result<AppliedTags, SaveError> {
        let current = self.get(note_id).await?;
        let names = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        self.reconciler
            .set_note_tags(note_id, names)
            .await
            .map_err(|source| SaveError::Tags {
                note: current.note,
                source,
            })
    }

    /// Daily note counts for the `days` ending on `today`.
    pub async fn activity(&self, today: NaiveDate, days: u32) -> Result<Vec<DayCount>, StoreError> {
        let owner_id = self.session.current_owner_id()?;
        let start = heatmap::window_start(today, days);
        let since = Utc
            .from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN))
            .to_rfc3339();
        let timestamps = self.contents.created_since(&owner_id, &since).await?;
        Ok(heatmap::daily_counts(
            timestamps.iter().map(String::as_str),
            today,
            days,
        ))
    }
}
