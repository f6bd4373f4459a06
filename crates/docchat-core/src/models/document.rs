use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Active,
    Inactive,
}

/// An ingested document; `name` is unique within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    /// Number of indexed chunks
    #[serde(default, alias = "chunks_added")]
    pub chunks: u32,
    #[serde(default)]
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Queued and processing look the same to a user
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }
}

/// Server-side ingestion of one submitted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: String,
    #[serde(alias = "filename", alias = "name")]
    pub file_name: String,
    pub status: JobStatus,
}

impl ProcessingJob {
    pub fn queued(job_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            status: JobStatus::Queued,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Queued.is_pending());
        assert!(JobStatus::Processing.is_pending());
    }

    #[test]
    fn test_parse_document_defaults() {
        let doc: Document = serde_json::from_str(r#"{"name": "a.pdf", "chunks": 7}"#).unwrap();
        assert_eq!(doc.chunks, 7);
        assert_eq!(doc.status, DocumentStatus::Active);
    }

    #[test]
    fn test_parse_processing_job() {
        let job: ProcessingJob = serde_json::from_str(
            r#"{"job_id": "j1", "filename": "b.pdf", "status": "processing"}"#,
        )
        .unwrap();
        assert_eq!(job.file_name, "b.pdf");
        assert_eq!(job.status, JobStatus::Processing);
    }
}
