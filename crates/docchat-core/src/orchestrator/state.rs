use std::collections::HashSet;

use serde::Serialize;

use crate::gateway::DocumentListing;
use crate::models::{Document, DocumentStatus, JobStatus, Message, ProcessingJob, Session};
use crate::uploads::{UploadOutcome, UploadProgress};

/// Everything a mounted orchestrator owns, guarded by one lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub session: Option<Session>,
    pub messages: Vec<Message>,
    pub documents: Vec<Document>,
    pub processing: Vec<ProcessingJob>,
    pub sending: bool,
    /// Batches currently transferring
    pub uploading: usize,
}

impl SessionState {
    /// Replace documents and jobs with the server's view. Jobs already in
    /// a terminal state, or settled here, are not tracked again.
    pub fn apply_listing(&mut self, listing: DocumentListing, settled: &HashSet<String>) {
        self.documents = listing.documents;
        self.processing = listing
            .processing_jobs
            .into_iter()
            .filter(|job| job.status.is_pending() && !settled.contains(&job.job_id))
            .collect();
    }

    /// Insert or replace by name
    pub fn upsert_document(&mut self, document: Document) {
        match self.documents.iter_mut().find(|d| d.name == document.name) {
            Some(existing) => *existing = document,
            None => self.documents.push(document),
        }
    }

    pub fn remove_document(&mut self, name: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.name != name);
        self.documents.len() != before
    }

    pub fn track_job(&mut self, job: ProcessingJob) {
        if !self.processing.iter().any(|j| j.job_id == job.job_id) {
            self.processing.push(job);
        }
    }

    pub fn remove_job(&mut self, job_id: &str) -> Option<ProcessingJob> {
        let index = self.processing.iter().position(|j| j.job_id == job_id)?;
        Some(self.processing.remove(index))
    }

    pub fn set_job_status(&mut self, job_id: &str, status: JobStatus) -> bool {
        match self.processing.iter_mut().find(|j| j.job_id == job_id) {
            Some(job) if job.status != status => {
                job.status = status;
                true
            }
            _ => false,
        }
    }

    /// A finished job becomes a document named after its file
    pub fn complete_job(&mut self, job: &ProcessingJob, chunks: u32) {
        self.remove_job(&job.job_id);
        self.upsert_document(Document {
            name: job.file_name.clone(),
            chunks,
            status: DocumentStatus::Active,
        });
        if let Some(session) = self.session.as_mut() {
            session.has_documents = true;
        }
    }
}

/// Render-facing snapshot of one orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Option<String>,
    pub session: Option<Session>,
    pub messages: Vec<Message>,
    pub sending: bool,
    pub uploading: bool,
    pub documents: Vec<Document>,
    pub processing_jobs: Vec<ProcessingJob>,
    pub uploads: Vec<UploadProgress>,
}

/// Result of a user action
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    /// Performed on the bound session
    Done(T),
    /// A session was created; the intent waits in the handoff store for the
    /// orchestrator mounted with this id
    Redirected(String),
    /// Nothing was done (blank input or the session could not be created)
    Dropped,
}

impl<T> Dispatch<T> {
    pub fn done(self) -> Option<T> {
        match self {
            Dispatch::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn redirected_to(&self) -> Option<&str> {
        match self {
            Dispatch::Redirected(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

/// How every file of one upload batch settled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Submitted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Failed { .. }))
    }

    pub fn canceled(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Canceled))
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.entries.iter().filter_map(|e| e.outcome.job_id()).collect()
    }

    fn count(&self, pred: impl Fn(&UploadOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, chunks: u32) -> Document {
        Document {
            name: name.to_string(),
            chunks,
            status: DocumentStatus::Active,
        }
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let mut state = SessionState::default();
        state.upsert_document(doc("a.pdf", 1));
        state.upsert_document(doc("b.pdf", 2));
        state.upsert_document(doc("a.pdf", 5));

        assert_eq!(state.documents.len(), 2);
        assert_eq!(state.documents[0].chunks, 5);
    }

    #[test]
    fn test_complete_job_moves_to_documents() {
        let mut state = SessionState::default();
        let job = ProcessingJob::queued("j1", "a.pdf");
        state.track_job(job.clone());
        state.track_job(job.clone());
        assert_eq!(state.processing.len(), 1);

        assert!(state.set_job_status("j1", JobStatus::Processing));
        assert!(!state.set_job_status("j1", JobStatus::Processing));

        state.complete_job(&job, 4);
        assert!(state.processing.is_empty());
        assert_eq!(state.documents, vec![doc("a.pdf", 4)]);
    }

    #[test]
    fn test_listing_skips_finished_jobs() {
        let mut errored = ProcessingJob::queued("j2", "b.pdf");
        errored.status = JobStatus::Error;
        let listing = DocumentListing {
            documents: vec![doc("c.pdf", 2)],
            processing_jobs: vec![
                ProcessingJob::queued("j1", "a.pdf"),
                errored,
                ProcessingJob::queued("j3", "d.pdf"),
            ],
        };
        let settled: HashSet<String> = ["j3".to_string()].into_iter().collect();

        let mut state = SessionState::default();
        state.apply_listing(listing, &settled);
        assert_eq!(state.documents, vec![doc("c.pdf", 2)]);
        let ids: Vec<&str> = state.processing.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["j1"]);
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            entries: vec![
                BatchEntry {
                    file_name: "a.pdf".into(),
                    outcome: UploadOutcome::Submitted { job_id: "j1".into() },
                },
                BatchEntry {
                    file_name: "b.pdf".into(),
                    outcome: UploadOutcome::Canceled,
                },
                BatchEntry {
                    file_name: "c.pdf".into(),
                    outcome: UploadOutcome::Failed {
                        message: "too big".into(),
                    },
                },
            ],
        };
        assert_eq!(report.submitted(), 1);
        assert_eq!(report.canceled(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.job_ids(), vec!["j1"]);

        let json = serde_json::to_value(&report.entries[0]).unwrap();
        assert_eq!(json["fileName"], "a.pdf");
        assert_eq!(json["outcome"], "submitted");
        assert_eq!(json["job_id"], "j1");
    }
}
