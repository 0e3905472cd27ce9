use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Changed {
        owner_id: Option<String>,
        note_id: String,
        created: Vec<String>,
        associated: Vec<String>,
        disassociated: Vec<String>,
        /// False when the run stopped on an error part way through.
        complete: bool,
    },
}

#[derive(Debug, Clone)]
pub struct TagEvents {
    tx: broadcast::Sender<TagEvent>,
}

impl TagEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TagEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, event: TagEvent) {
        // No listeners is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for TagEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
