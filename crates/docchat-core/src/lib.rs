pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod handoff;
pub mod host;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod poller;
pub mod tracing_setup;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CoreConfig;
pub use directory::{DirectoryView, LoadStatus, SessionDirectory};
pub use error::{CoreError, GatewayError};
pub use gateway::{Gateway, HttpGateway};
pub use handoff::HandoffStore;
pub use host::{AutoConfirm, Confirm, Navigator, RecordingNavigator};
pub use notify::{Notification, NotificationLevel, NotificationLog, Notifier};
pub use orchestrator::{
    BatchEntry, BatchReport, Dispatch, OrchestratorContext, SessionOrchestrator, SessionView,
};
pub use poller::{JobOutcome, PollPolicy};
pub use uploads::{UploadOutcome, UploadProgress};
