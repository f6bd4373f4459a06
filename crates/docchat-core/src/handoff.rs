//! Single-read mailbox for user intent that has to survive the switch from
//! an unbound orchestrator to the one mounted with the freshly created
//! session id.
//!
//! Each slot holds at most one value. A second `set` before a `take`
//! replaces the first; `take` empties the slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::PendingFile;

#[derive(Debug, Default)]
struct Slots {
    message: Option<String>,
    files: Option<Vec<PendingFile>>,
}

/// Cheap to clone; clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct HandoffStore {
    slots: Arc<Mutex<Slots>>,
}

impl HandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending_message(&self, text: impl Into<String>) {
        let mut slots = self.slots.lock();
        if slots.message.is_some() {
            tracing::debug!("Replacing unread pending message");
        }
        slots.message = Some(text.into());
    }

    pub fn take_pending_message(&self) -> Option<String> {
        self.slots.lock().message.take()
    }

    pub fn set_pending_files(&self, files: Vec<PendingFile>) {
        let mut slots = self.slots.lock();
        if slots.files.is_some() {
            tracing::debug!("Replacing unread pending file batch");
        }
        slots.files = Some(files);
    }

    pub fn take_pending_files(&self) -> Option<Vec<PendingFile>> {
        self.slots.lock().files.take()
    }

    pub fn is_empty(&self) -> bool {
        let slots = self.slots.lock();
        slots.message.is_none() && slots.files.is_none()
    }
}
