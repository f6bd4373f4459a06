//! Request/response contract with the chat and document service.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{Document, JobStatus, Message, PendingFile, ProcessingJob, Session};

pub use http::HttpGateway;

/// Receives upload progress as a percentage of bytes handed to the transport.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Reply to a sent message
#[derive(Debug, Clone, PartialEq)]
pub struct SendReply {
    pub bot_message: Message,
    /// Updated count for the session, when the server reports one
    pub message_count: Option<u32>,
}

/// Server view of a session's documents: finalized ones plus jobs still ingesting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentListing {
    #[serde(default, rename = "finalized", alias = "pdfs")]
    pub documents: Vec<Document>,
    #[serde(default, rename = "processing")]
    pub processing_jobs: Vec<ProcessingJob>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitReceipt {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub chunks_added: Option<u32>,
    /// Server explanation for an `error` status
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<Session>, GatewayError>;

    async fn create_session(&self) -> Result<Session, GatewayError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError>;

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), GatewayError>;

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, GatewayError>;

    /// The server computes the reply synchronously.
    async fn send_message(&self, session_id: &str, text: &str) -> Result<SendReply, GatewayError>;

    async fn list_documents(&self, session_id: &str) -> Result<DocumentListing, GatewayError>;

    /// Resolves once the bytes are accepted; ingestion continues server-side
    /// under the returned job id.
    async fn submit_document(
        &self,
        session_id: &str,
        file: &PendingFile,
        progress: ProgressFn,
    ) -> Result<SubmitReceipt, GatewayError>;

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, GatewayError>;

    async fn delete_document(&self, session_id: &str, name: &str) -> Result<(), GatewayError>;

    /// The service has no single-session endpoint, so the record is looked
    /// up in the full list.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, GatewayError> {
        let sessions = self.list_sessions().await?;
        Ok(sessions.into_iter().find(|s| s.id == session_id))
    }
}
