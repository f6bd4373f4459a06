//! Scripted in-memory gateway for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::GatewayError;
use crate::gateway::{
    DocumentListing, Gateway, JobStatusReport, ProgressFn, SendReply, SubmitReceipt,
};
use crate::models::{
    Document, DocumentStatus, JobStatus, Message, PendingFile, ProcessingJob, Session,
};

/// What `submit_document` does for a given file name
#[derive(Clone)]
pub enum UploadPlan {
    Accept { job_id: String },
    Reject { status: u16, message: String },
    /// Report 50%, wait for the gate, then accept
    Hold { job_id: String, gate: Arc<Notify> },
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<Session>,
    messages: HashMap<String, Vec<Message>>,
    documents: HashMap<String, Vec<Document>>,
    processing: HashMap<String, Vec<ProcessingJob>>,
    /// job id -> (session id, file name)
    job_origin: HashMap<String, (String, String)>,
    job_scripts: HashMap<String, VecDeque<Result<JobStatusReport, u16>>>,
    send_results: VecDeque<Result<String, u16>>,
    upload_plans: HashMap<String, UploadPlan>,
    fail_create: bool,
    fail_list_documents: bool,
    fail_delete_document: bool,
    send_delay: Duration,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
}

pub fn status_report(status: JobStatus, chunks: Option<u32>) -> JobStatusReport {
    JobStatusReport {
        status,
        chunks_added: chunks,
        error: None,
    }
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_session(self: &Arc<Self>, id: &str, title: &str) -> Arc<Self> {
        self.state.lock().sessions.push(Session {
            id: id.to_string(),
            title: title.to_string(),
            updated_at: None,
            message_count: 0,
            has_documents: false,
            document_count: None,
        });
        self.clone()
    }

    pub fn add_document(&self, session_id: &str, name: &str, chunks: u32) {
        self.state
            .lock()
            .documents
            .entry(session_id.to_string())
            .or_default()
            .push(Document {
                name: name.to_string(),
                chunks,
                status: DocumentStatus::Active,
            });
    }

    pub fn add_processing(&self, session_id: &str, job_id: &str, file_name: &str) {
        let mut state = self.state.lock();
        state
            .processing
            .entry(session_id.to_string())
            .or_default()
            .push(ProcessingJob {
                job_id: job_id.to_string(),
                file_name: file_name.to_string(),
                status: JobStatus::Processing,
            });
        state
            .job_origin
            .insert(job_id.to_string(), (session_id.to_string(), file_name.to_string()));
    }

    /// A job the listing keeps reporting with `status` no matter what its
    /// status checks return.
    pub fn add_stale_job(&self, session_id: &str, job_id: &str, file_name: &str, status: JobStatus) {
        self.state
            .lock()
            .processing
            .entry(session_id.to_string())
            .or_default()
            .push(ProcessingJob {
                job_id: job_id.to_string(),
                file_name: file_name.to_string(),
                status,
            });
    }

    pub fn plan_upload(&self, file_name: &str, plan: UploadPlan) {
        self.state.lock().upload_plans.insert(file_name.to_string(), plan);
    }

    /// Statuses returned by successive `get_job_status` calls; `Err(code)`
    /// makes the call itself fail.
    pub fn script_job(&self, job_id: &str, steps: Vec<Result<JobStatusReport, u16>>) {
        self.state
            .lock()
            .job_scripts
            .insert(job_id.to_string(), steps.into());
    }

    /// Queue the outcome of the next send: `Ok(reply)` or `Err(status)`
    pub fn script_send(&self, result: Result<&str, u16>) {
        self.state
            .lock()
            .send_results
            .push_back(result.map(str::to_string));
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().send_delay = delay;
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn fail_list_documents(&self, fail: bool) {
        self.state.lock().fail_list_documents = fail;
    }

    pub fn fail_delete_document(&self, fail: bool) {
        self.state.lock().fail_delete_document = fail;
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn server_documents(&self, session_id: &str) -> Vec<Document> {
        self.state
            .lock()
            .documents
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn fail(status: u16) -> GatewayError {
    GatewayError::status(status, Some(format!("scripted failure {}", status)))
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn list_sessions(&self) -> Result<Vec<Session>, GatewayError> {
        self.record("list_sessions".into());
        Ok(self.state.lock().sessions.clone())
    }

    async fn create_session(&self) -> Result<Session, GatewayError> {
        self.record("create_session".into());
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(fail(500));
        }
        state.next_id += 1;
        let session = Session {
            id: format!("s{}", state.next_id),
            title: "New Chat".to_string(),
            updated_at: None,
            message_count: 0,
            has_documents: false,
            document_count: None,
        };
        state.sessions.insert(0, session.clone());
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.record(format!("delete_session:{}", session_id));
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != session_id);
        if state.sessions.len() == before {
            return Err(fail(404));
        }
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), GatewayError> {
        self.record(format!("rename_session:{}", session_id));
        let mut state = self.state.lock();
        match state.sessions.iter_mut().find(|s| s.id == session_id) {
            Some(session) => {
                session.title = title.to_string();
                Ok(())
            }
            None => Err(fail(404)),
        }
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, GatewayError> {
        self.record(format!("get_messages:{}", session_id));
        Ok(self
            .state
            .lock()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, session_id: &str, text: &str) -> Result<SendReply, GatewayError> {
        self.record(format!("send_message:{}:{}", session_id, text));
        let delay = self.state.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let reply = match state.send_results.pop_front() {
            Some(Ok(reply)) => reply,
            Some(Err(status)) => return Err(fail(status)),
            None => format!("echo: {}", text),
        };
        let bot = Message::bot(reply, Vec::new());
        let log = state.messages.entry(session_id.to_string()).or_default();
        log.push(Message::user(text));
        log.push(bot.clone());
        let count = log.len() as u32;
        if let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) {
            session.message_count = count;
        }
        Ok(SendReply {
            bot_message: bot,
            message_count: Some(count),
        })
    }

    async fn list_documents(&self, session_id: &str) -> Result<DocumentListing, GatewayError> {
        self.record(format!("list_documents:{}", session_id));
        let state = self.state.lock();
        if state.fail_list_documents {
            return Err(fail(503));
        }
        Ok(DocumentListing {
            documents: state.documents.get(session_id).cloned().unwrap_or_default(),
            processing_jobs: state.processing.get(session_id).cloned().unwrap_or_default(),
        })
    }

    async fn submit_document(
        &self,
        session_id: &str,
        file: &PendingFile,
        progress: ProgressFn,
    ) -> Result<SubmitReceipt, GatewayError> {
        self.record(format!("submit_document:{}:{}", session_id, file.name));
        let plan = self
            .state
            .lock()
            .upload_plans
            .get(&file.name)
            .cloned()
            .unwrap_or_else(|| UploadPlan::Accept {
                job_id: format!("job-{}", file.name),
            });

        progress(50);
        let job_id = match plan {
            UploadPlan::Accept { job_id } => job_id,
            UploadPlan::Reject { status, message } => {
                return Err(GatewayError::status(status, Some(message)));
            }
            UploadPlan::Hold { job_id, gate } => {
                gate.notified().await;
                job_id
            }
        };
        progress(100);

        self.add_processing(session_id, &job_id, &file.name);
        Ok(SubmitReceipt { job_id })
    }

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, GatewayError> {
        self.record(format!("get_job_status:{}", job_id));
        let mut state = self.state.lock();
        let step = state
            .job_scripts
            .get_mut(job_id)
            .and_then(|steps| steps.pop_front())
            .unwrap_or_else(|| Ok(status_report(JobStatus::Done, Some(1))));
        let report = step.map_err(fail)?;

        if report.status.is_terminal() {
            if let Some((session_id, file_name)) = state.job_origin.remove(job_id) {
                if let Some(jobs) = state.processing.get_mut(&session_id) {
                    jobs.retain(|j| j.job_id != job_id);
                }
                if report.status == JobStatus::Done {
                    state.documents.entry(session_id).or_default().push(Document {
                        name: file_name,
                        chunks: report.chunks_added.unwrap_or(0),
                        status: DocumentStatus::Active,
                    });
                }
            }
        }
        Ok(report)
    }

    async fn delete_document(&self, session_id: &str, name: &str) -> Result<(), GatewayError> {
        self.record(format!("delete_document:{}:{}", session_id, name));
        let mut state = self.state.lock();
        if state.fail_delete_document {
            return Err(fail(500));
        }
        if let Some(docs) = state.documents.get_mut(session_id) {
            docs.retain(|d| d.name != name);
        }
        Ok(())
    }
}
