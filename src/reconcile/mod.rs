//! Keeps a note's tag associations in line with the hashtags in its content.

mod events;
mod extract;
mod plan;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::models::Tag;
use crate::store::{SessionProvider, StoreError, TagStore};

pub use events::{TagEvent, TagEvents};
pub use extract::{extract_tag_names, strip_markup};
pub use plan::{reconcile, PlannedAssociation, TagPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    Create,
    Associate,
    Disassociate,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStep::Create => write!(f, "create"),
            ReconcileStep::Associate => write!(f, "associate"),
            ReconcileStep::Disassociate => write!(f, "disassociate"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedTags {
    pub associations: BTreeMap<String, String>,
    pub created: Vec<Tag>,
}

impl AppliedTags {
    pub fn names(&self) -> BTreeSet<String> {
        self.associations.keys().cloned().collect()
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A step failed. Earlier steps stay applied and are reported in `applied`.
    #[error("failed to {step} tag `{tag}`: {source}")]
    Step {
        step: ReconcileStep,
        tag: String,
        source: StoreError,
        applied: AppliedTags,
    },
}

impl ReconcileError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            ReconcileError::Store(e) => e,
            ReconcileError::Step { source, .. } => source,
        }
    }

    pub fn applied(&self) -> Option<&AppliedTags> {
        match self {
            ReconcileError::Store(_) => None,
            ReconcileError::Step { applied, .. } => Some(applied),
        }
    }
}

struct StepFailure {
    step: ReconcileStep,
    tag: String,
    source: StoreError,
}

impl StepFailure {
    fn new(step: ReconcileStep, tag: &str, source: StoreError) -> Self {
        Self {
            step,
            tag: tag.to_string(),
            source,
        }
    }
}

#[derive(Default)]
struct Progress {
    applied: AppliedTags,
    associated: Vec<String>,
    disassociated: Vec<String>,
}

impl Progress {
    fn mutated(&self) -> bool {
        !self.applied.created.is_empty() || !self.associated.is_empty() || !self.disassociated.is_empty()
    }
}

#[derive(Clone)]
pub struct TagReconciler {
    tags: Arc<dyn TagStore>,
    session: Arc<dyn SessionProvider>,
    events: TagEvents,
}

impl TagReconciler {
    pub fn new(tags: Arc<dyn TagStore>, session: Arc<dyn SessionProvider>, events: TagEvents) -> Self {
        Self {
            tags,
            session,
            events,
        }
    }

    pub async fn sync_note(&self, note_id: &str, content: &str) -> Result<AppliedTags, ReconcileError> {
        self.set_note_tags(note_id, extract_tag_names(content)).await
    }

    pub async fn set_note_tags(
        &self,
        note_id: &str,
        desired: BTreeSet<String>,
    ) -> Result<AppliedTags, ReconcileError> {
        let owner_id = self.session.current_owner_id()?;
        let note_tags = self.tags.list_for_note(note_id).await?;
        let owner_tags = self.tags.list_for_owner(&owner_id).await?;

        let mut known: HashMap<String, String> = HashMap::new();
        for tag in owner_tags {
            known.entry(tag.name).or_insert(tag.id);
        }
        // The note's own ids win when a name exists more than once.
        for tag in &note_tags {
            known.insert(tag.name.clone(), tag.id.clone());
        }

        let current: BTreeSet<String> = note_tags.into_iter().map(|t| t.name).collect();
        let plan = reconcile(note_id, &current, &desired, &known);
        tracing::debug!(
            note_id,
            create = plan.to_create.len(),
            associate = plan.to_associate.len(),
            disassociate = plan.to_disassociate.len(),
            "planned tag changes"
        );

        self.apply(&plan).await
    }

    /// Runs creations, then associations, then disassociations, stopping at
    /// the first failure without undoing earlier steps.
    pub async fn apply(&self, plan: &TagPlan) -> Result<AppliedTags, ReconcileError> {
        let mut progress = Progress {
            applied: AppliedTags {
                associations: plan.current.clone(),
                created: Vec::new(),
            },
            ..Progress::default()
        };

        let outcome = self.execute(plan, &mut progress).await;

        if progress.mutated() {
            self.events.publish(TagEvent::Changed {
                owner_id: self.session.current_owner_id().ok(),
                note_id: plan.note_id.clone(),
                created: progress.applied.created.iter().map(|t| t.name.clone()).collect(),
                associated: progress.associated,
                disassociated: progress.disassociated,
                complete: outcome.is_ok(),
            });
        }

        match outcome {
            Ok(()) => Ok(progress.applied),
            Err(failure) => {
                tracing::warn!(
                    note_id = %plan.note_id,
                    step = %failure.step,
                    tag = %failure.tag,
                    error = %failure.source,
                    "tag reconciliation stopped"
                );
                Err(ReconcileError::Step {
                    step: failure.step,
                    tag: failure.tag,
                    source: failure.source,
                    applied: progress.applied,
                })
            }
        }
    }

    async fn execute(&self, plan: &TagPlan, progress: &mut Progress) -> Result<(), StepFailure> {
        let mut created_ids: HashMap<&str, String> = HashMap::new();

        if let Some(first) = plan.to_create.first() {
            let owner_id = self
                .session
                .current_owner_id()
                .map_err(|e| StepFailure::new(ReconcileStep::Create, first, e))?;

            for name in &plan.to_create {
                let tag = self
                    .tags
                    .create(&owner_id, name)
                    .await
                    .map_err(|e| StepFailure::new(ReconcileStep::Create, name, e))?;
                tracing::debug!(tag = %name, tag_id = %tag.id, "created tag");
                created_ids.insert(name.as_str(), tag.id.clone());
                progress.applied.created.push(tag);
            }
        }

        for association in &plan.to_associate {
            let name = association.name.as_str();
            let tag_id = match &association.tag_id {
                Some(id) => id.clone(),
                None => created_ids.get(name).cloned().ok_or_else(|| {
                    StepFailure::new(
                        ReconcileStep::Associate,
                        name,
                        StoreError::NotFound(format!("tag {name}")),
                    )
                })?,
            };

            self.tags
                .associate(&plan.note_id, &tag_id)
                .await
                .map_err(|e| StepFailure::new(ReconcileStep::Associate, name, e))?;
            progress.applied.associations.insert(name.to_string(), tag_id);
            progress.associated.push(name.to_string());
        }

        for (name, tag_id) in &plan.to_disassociate {
            self.tags
                .disassociate(&plan.note_id, tag_id)
                .await
                .map_err(|e| StepFailure::new(ReconcileStep::Disassociate, name, e))?;
            progress.applied.associations.remove(name);
            progress.disassociated.push(name.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::store::{ContentStore, MemoryStore, OwnerSession};

    /// Records tag store calls and can fail the n-th association.
    struct Recording {
        inner: Arc<MemoryStore>,
        calls: Mutex<Vec<String>>,
        fail_associate_at: Option<usize>,
        associations_seen: Mutex<usize>,
    }

    impl Recording {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                calls: Mutex::new(Vec::new()),
                fail_associate_at: None,
                associations_seen: Mutex::new(0),
            }
        }

        fn failing_associate(inner: Arc<MemoryStore>, nth: usize) -> Self {
            Self {
                fail_associate_at: Some(nth),
                ..Self::new(inner)
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl TagStore for Recording {
        async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Tag>, StoreError> {
            TagStore::list_for_owner(self.inner.as_ref(), owner_id).await
        }

        async fn list_for_note(&self, note_id: &str) -> Result<Vec<Tag>, StoreError> {
            self.inner.list_for_note(note_id).await
        }

        async fn create(&self, owner_id: &str, name: &str) -> Result<Tag, StoreError> {
            self.record(format!("create {name}"));
            self.inner.create(owner_id, name).await
        }

        async fn associate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
            let seen = {
                let mut seen = self.associations_seen.lock().unwrap();
                *seen += 1;
                *seen
            };
            if self.fail_associate_at == Some(seen) {
                return Err(StoreError::Network("connection reset".to_string()));
            }
            self.record(format!("associate {tag_id}"));
            self.inner.associate(note_id, tag_id).await
        }

        async fn disassociate(&self, note_id: &str, tag_id: &str) -> Result<(), StoreError> {
            self.record(format!("disassociate {tag_id}"));
            self.inner.disassociate(note_id, tag_id).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        recording: Arc<Recording>,
        reconciler: TagReconciler,
        events: TagEvents,
        note_id: String,
    }

    async fn fixture_with(make: impl FnOnce(Arc<MemoryStore>) -> Recording) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let note = store.save("owner", None, "").await.unwrap();
        let recording = Arc::new(make(store.clone()));
        let events = TagEvents::default();
        let reconciler = TagReconciler::new(
            recording.clone(),
            Arc::new(OwnerSession::authenticated("owner")),
            events.clone(),
        );
        Fixture {
            store,
            recording,
            reconciler,
            events,
            note_id: note.id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Recording::new).await
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn stored_names(fx: &Fixture) -> BTreeSet<String> {
        fx.store
            .list_for_note(&fx.note_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[tokio::test]
    async fn new_hashtags_are_created_and_associated() {
        let fx = fixture().await;

        let applied = fx
            .reconciler
            .sync_note(&fx.note_id, "Hello #work and #life")
            .await
            .unwrap();

        assert_eq!(applied.names(), set(&["work", "life"]));
        assert_eq!(applied.created.len(), 2);
        assert_eq!(stored_names(&fx).await, set(&["work", "life"]));
        let calls = fx.recording.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("create")).count(), 2);
        assert_eq!(calls.iter().filter(|c| c.starts_with("associate")).count(), 2);
    }

    #[tokio::test]
    async fn removing_a_hashtag_only_disassociates_it() {
        let fx = fixture().await;
        fx.reconciler
            .sync_note(&fx.note_id, "#work #life")
            .await
            .unwrap();
        let before = fx.recording.calls().len();

        let applied = fx
            .reconciler
            .sync_note(&fx.note_id, "Hello #work")
            .await
            .unwrap();

        assert_eq!(applied.names(), set(&["work"]));
        let calls = fx.recording.calls()[before..].to_vec();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("disassociate"));
        // The orphaned tag is kept.
        let owned = TagStore::list_for_owner(fx.store.as_ref(), "owner").await.unwrap();
        assert_eq!(owned.len(), 2);
    }

    #[tokio::test]
    async fn content_without_hashtags_clears_tags() {
        let fx = fixture().await;
        fx.reconciler.sync_note(&fx.note_id, "#life").await.unwrap();
        let before = fx.recording.calls().len();

        let applied = fx
            .reconciler
            .sync_note(&fx.note_id, "<p>nothing tagged</p>")
            .await
            .unwrap();

        assert!(applied.associations.is_empty());
        let calls = fx.recording.calls()[before..].to_vec();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("disassociate"));
        assert!(stored_names(&fx).await.is_empty());
    }

    #[tokio::test]
    async fn case_differing_hashtags_create_separate_tags() {
        let fx = fixture().await;

        let applied = fx
            .reconciler
            .sync_note(&fx.note_id, "#Work #work")
            .await
            .unwrap();

        assert_eq!(applied.created.len(), 2);
        assert_eq!(applied.names(), set(&["Work", "work"]));
    }

    #[tokio::test]
    async fn unchanged_content_makes_no_store_calls() {
        let fx = fixture().await;
        fx.reconciler
            .sync_note(&fx.note_id, "#work #life")
            .await
            .unwrap();
        let before = fx.recording.calls().len();
        let mut rx = fx.events.subscribe();

        fx.reconciler
            .sync_note(&fx.note_id, "edited text, same #life and #work")
            .await
            .unwrap();

        assert_eq!(fx.recording.calls().len(), before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn existing_owner_tags_are_reused() {
        let fx = fixture().await;
        let other = fx.store.save("owner", None, "").await.unwrap();
        fx.reconciler.sync_note(&other.id, "#shared").await.unwrap();
        let before = fx.recording.calls().len();

        let applied = fx.reconciler.sync_note(&fx.note_id, "#shared").await.unwrap();

        assert!(applied.created.is_empty());
        let calls = fx.recording.calls()[before..].to_vec();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("associate"));
    }

    #[tokio::test]
    async fn failed_association_keeps_earlier_steps() {
        let fx = fixture_with(|store| Recording::failing_associate(store, 2)).await;
        let mut rx = fx.events.subscribe();

        let err = fx
            .reconciler
            .sync_note(&fx.note_id, "Hello #work and #life")
            .await
            .unwrap_err();

        match &err {
            ReconcileError::Step {
                step,
                tag,
                source,
                applied,
            } => {
                assert_eq!(*step, ReconcileStep::Associate);
                assert_eq!(tag, "work");
                assert!(matches!(source, StoreError::Network(_)));
                assert_eq!(applied.names(), set(&["life"]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("associate tag `work`"));
        assert_eq!(stored_names(&fx).await, set(&["life"]));

        match rx.recv().await.unwrap() {
            TagEvent::Changed {
                complete,
                associated,
                ..
            } => {
                assert!(!complete);
                assert_eq!(associated, vec!["life".to_string()]);
            }
        }

        // A retry plans only what is still missing.
        let before = fx.recording.calls().len();
        let applied = fx
            .reconciler
            .sync_note(&fx.note_id, "Hello #work and #life")
            .await
            .unwrap();
        assert_eq!(applied.names(), set(&["work", "life"]));
        let calls = fx.recording.calls()[before..].to_vec();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("associate"));
    }

    #[tokio::test]
    async fn applied_plan_matches_store_state() {
        let fx = fixture().await;
        let steps = ["#a #b", "#b #c", "#c", "", "#a #c #d"];

        for content in steps {
            let applied = fx.reconciler.sync_note(&fx.note_id, content).await.unwrap();
            let desired = extract_tag_names(content);
            assert_eq!(applied.names(), desired);
            assert_eq!(stored_names(&fx).await, desired);
        }
    }

    #[tokio::test]
    async fn change_event_is_published() {
        let fx = fixture().await;
        let mut rx = fx.events.subscribe();

        fx.reconciler.sync_note(&fx.note_id, "#work").await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            TagEvent::Changed {
                owner_id: Some("owner".to_string()),
                note_id: fx.note_id.clone(),
                created: vec!["work".to_string()],
                associated: vec!["work".to_string()],
                disassociated: vec![],
                complete: true,
            }
        );
    }

    #[tokio::test]
    async fn signed_out_session_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let note = store.save("owner", None, "").await.unwrap();
        let reconciler = TagReconciler::new(store, Arc::new(OwnerSession::new()), TagEvents::default());

        let err = reconciler.sync_note(&note.id, "#work").await.unwrap_err();

        assert_eq!(err.store_error(), &StoreError::Authentication);
        assert!(err.applied().is_none());
    }
}
