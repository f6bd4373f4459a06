//! Seams to the application hosting the core: routing and confirmation.

use parking_lot::Mutex;
use std::sync::Arc;

/// Moves the host to the view of another session. The current orchestrator
/// is expected to be torn down and a new one mounted with `session_id`.
pub trait Navigator: Send + Sync {
    fn navigate(&self, session_id: &str);
}

/// Asks the user to confirm a destructive action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Confirms or declines everything
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Records navigation requests instead of acting on them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, session_id: &str) {
        self.targets.lock().push(session_id.to_string());
    }
}
