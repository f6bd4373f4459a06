pub mod document;
pub mod file;
pub mod message;
pub mod session;

pub use document::{Document, DocumentStatus, JobStatus, ProcessingJob};
pub use file::PendingFile;
pub use message::{Message, Sender, SourceReference};
pub use session::Session;
