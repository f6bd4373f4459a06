//! Concurrent, individually cancelable document uploads.
//!
//! A task lives in the set only while its bytes are in transit. It is
//! removed exactly once, when its transfer settles, whatever the outcome.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, ProgressFn};
use crate::models::PendingFile;

pub type TaskId = u64;

/// Called whenever the task set or a task's progress changes
pub type ChangeFn = Arc<dyn Fn() + Send + Sync>;

/// Render-facing view of one in-flight upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadProgress {
    pub task_id: TaskId,
    pub file_name: String,
    pub bytes: u64,
    /// 0..=100, where 100 means fully transmitted, not processed
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UploadOutcome {
    /// Bytes accepted; ingestion continues server-side under `job_id`
    Submitted { job_id: String },
    Failed { message: String },
    Canceled,
}

impl UploadOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            UploadOutcome::Submitted { job_id } => Some(job_id),
            _ => None,
        }
    }
}

struct UploadEntry {
    file_name: String,
    bytes: u64,
    progress: u8,
    cancel: CancellationToken,
}

type TaskMap = Arc<Mutex<BTreeMap<TaskId, UploadEntry>>>;

/// Handle returned by [`UploadManager::start`]
pub struct UploadHandle {
    pub task_id: TaskId,
    pub file_name: String,
    cancel: CancellationToken,
    join: JoinHandle<UploadOutcome>,
}

impl UploadHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the transfer to settle
    pub async fn completion(self) -> UploadOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => UploadOutcome::Canceled,
            Err(e) => UploadOutcome::Failed {
                message: format!("Upload task panicked: {}", e),
            },
        }
    }
}

#[derive(Clone)]
pub struct UploadManager {
    gateway: Arc<dyn Gateway>,
    tasks: TaskMap,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
    on_change: Option<ChangeFn>,
}

impl UploadManager {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
            on_change: None,
        }
    }

    /// Tie every task to `shutdown`: cancelling it cancels all uploads.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_change_hook(mut self, on_change: ChangeFn) -> Self {
        self.on_change = Some(on_change);
        self
    }

    pub fn start(&self, session_id: &str, file: PendingFile) -> UploadHandle {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let file_name = file.name.clone();

        self.tasks.lock().insert(
            task_id,
            UploadEntry {
                file_name: file_name.clone(),
                bytes: file.len(),
                progress: 0,
                cancel: cancel.clone(),
            },
        );
        self.changed();
        debug!(task_id, file = %file_name, "Upload started");

        let progress = self.progress_sink(task_id);
        let gateway = self.gateway.clone();
        let session_id = session_id.to_string();
        let token = cancel.clone();
        let manager = self.clone();

        let join = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => UploadOutcome::Canceled,
                result = gateway.submit_document(&session_id, &file, progress) => match result {
                    Ok(receipt) => UploadOutcome::Submitted { job_id: receipt.job_id },
                    Err(e) => UploadOutcome::Failed { message: e.to_string() },
                },
            };

            manager.settle(task_id);
            match &outcome {
                UploadOutcome::Submitted { job_id } => {
                    info!(task_id, file = %file.name, job_id = %job_id, "Upload accepted")
                }
                UploadOutcome::Failed { message } => {
                    warn!(task_id, file = %file.name, error = %message, "Upload failed")
                }
                UploadOutcome::Canceled => info!(task_id, file = %file.name, "Upload canceled"),
            }
            outcome
        });

        UploadHandle {
            task_id,
            file_name,
            cancel,
            join,
        }
    }

    /// Abort an in-flight transfer. Returns false if the task already settled.
    /// The entry is removed when the transfer observes the cancellation.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self.tasks.lock().get(&task_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<UploadProgress> {
        self.tasks
            .lock()
            .iter()
            .map(|(id, entry)| UploadProgress {
                task_id: *id,
                file_name: entry.file_name.clone(),
                bytes: entry.bytes,
                progress: entry.progress,
            })
            .collect()
    }

    pub fn progress_of(&self, task_id: TaskId) -> Option<u8> {
        self.tasks.lock().get(&task_id).map(|e| e.progress)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Idempotent: a second call for the same task does nothing.
    fn settle(&self, task_id: TaskId) -> bool {
        let removed = self.tasks.lock().remove(&task_id).is_some();
        if removed {
            self.changed();
        }
        removed
    }

    /// Progress is clamped to 0..=100 and never moves backwards. Events
    /// arriving after settlement find no entry and are dropped.
    fn progress_sink(&self, task_id: TaskId) -> ProgressFn {
        let tasks = Arc::downgrade(&self.tasks);
        let on_change = self.on_change.clone();
        Arc::new(move |percent: u8| {
            let Some(tasks) = tasks.upgrade() else {
                return;
            };
            let updated = match tasks.lock().get_mut(&task_id) {
                Some(entry) => {
                    let next = percent.min(100).max(entry.progress);
                    let moved = next != entry.progress;
                    entry.progress = next;
                    moved
                }
                None => false,
            };
            if updated {
                if let Some(hook) = &on_change {
                    hook();
                }
            }
        })
    }

    fn changed(&self) {
        if let Some(hook) = &self.on_change {
            hook();
        }
    }
}
