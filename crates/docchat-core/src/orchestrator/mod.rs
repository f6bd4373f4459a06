//! Per-session orchestration.
//!
//! A [`SessionOrchestrator`] is mounted either without a session (it only
//! creates one on demand and redirects) or bound to an existing session id.
//! The bound instance owns the transcript, the document list, the in-flight
//! uploads and one poll loop per processing job.

mod state;

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::CoreConfig;
use crate::error::{CoreError, GatewayError};
use crate::gateway::Gateway;
use crate::handoff::HandoffStore;
use crate::host::{AutoConfirm, Confirm, Navigator, RecordingNavigator};
use crate::models::{Message, PendingFile, ProcessingJob};
use crate::notify::{Notification, NotificationLog, Notifier};
use crate::poller::{poll_job, JobOutcome};
use crate::uploads::{TaskId, UploadManager, UploadOutcome};

use state::SessionState;
pub use state::{BatchEntry, BatchReport, Dispatch, SessionView};

/// Collaborators shared by every orchestrator the host mounts.
#[derive(Clone)]
pub struct OrchestratorContext {
    pub gateway: Arc<dyn Gateway>,
    pub handoff: HandoffStore,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub confirm: Arc<dyn Confirm>,
    pub config: CoreConfig,
}

impl OrchestratorContext {
    /// Notifications go to an in-memory log, navigation is only recorded and
    /// destructive actions are declined until the host provides its own seams.
    pub fn new(gateway: Arc<dyn Gateway>, config: CoreConfig) -> Self {
        Self {
            gateway,
            handoff: HandoffStore::new(),
            notifier: Arc::new(NotificationLog::new()),
            navigator: Arc::new(RecordingNavigator::new()),
            confirm: Arc::new(AutoConfirm(false)),
            config,
        }
    }

    pub fn with_handoff(mut self, handoff: HandoffStore) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }
}

struct Inner {
    ctx: OrchestratorContext,
    session_id: Option<String>,
    state: Mutex<SessionState>,
    uploads: UploadManager,
    shutdown: CancellationToken,
    revision: Arc<watch::Sender<u64>>,
    send_lane: tokio::sync::Mutex<()>,
    /// Id of the session this unbound instance created
    created: OnceCell<String>,
    navigated: AtomicBool,
    /// Jobs with a live poll loop
    polling: Mutex<HashSet<String>>,
    /// Jobs whose loop gave up without a server verdict; never re-polled
    abandoned: Mutex<HashSet<String>>,
    /// Jobs that ended done or error; dropped from later listings
    settled: Mutex<HashSet<String>>,
    handoff_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let out = f(&mut self.state.lock());
        self.bump();
        out
    }

    fn notify(&self, notification: Notification) {
        self.ctx.notifier.notify(notification);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Clone, Copy)]
enum Busy {
    Sending,
    Uploading,
}

/// Raises a busy flag for its lifetime
struct BusyGuard<'a> {
    inner: &'a Inner,
    busy: Busy,
}

impl<'a> BusyGuard<'a> {
    fn enter(inner: &'a Inner, busy: Busy) -> Self {
        inner.update(|s| match busy {
            Busy::Sending => s.sending = true,
            Busy::Uploading => s.uploading += 1,
        });
        Self { inner, busy }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let busy = self.busy;
        self.inner.update(|s| match busy {
            Busy::Sending => s.sending = false,
            Busy::Uploading => s.uploading = s.uploading.saturating_sub(1),
        });
    }
}

/// Cheap to clone; clones drive the same session. Background work holds
/// weak references, so dropping the last clone tears everything down.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    /// Mount an orchestrator. With a session id, the transcript, documents and
    /// session record are loaded concurrently, polling resumes for jobs the
    /// server still reports, the sweep starts and any handed-off intent runs
    /// in the background.
    #[instrument(skip(ctx))]
    pub async fn mount(
        ctx: OrchestratorContext,
        session_id: Option<String>,
    ) -> Result<Self, CoreError> {
        let Some(id) = session_id else {
            debug!("Mounted without a session");
            return Ok(Self::new(ctx, None, SessionState::default()));
        };

        let gateway = ctx.gateway.clone();
        let (messages, listing, session) = tokio::try_join!(
            gateway.get_messages(&id),
            gateway.list_documents(&id),
            gateway.get_session(&id),
        )
        .map_err(|e| {
            if e.is_not_found() {
                CoreError::SessionNotFound(id.clone())
            } else {
                CoreError::Gateway(e)
            }
        })?;
        let session = session.ok_or_else(|| CoreError::SessionNotFound(id.clone()))?;

        let mut state = SessionState {
            session: Some(session),
            messages,
            ..SessionState::default()
        };
        state.apply_listing(listing, &HashSet::new());
        info!(
            session_id = %id,
            messages = state.messages.len(),
            documents = state.documents.len(),
            processing = state.processing.len(),
            "Session mounted"
        );

        let this = Self::new(ctx, Some(id), state);
        this.resume_polling();
        this.start_sweep();
        this.drain_handoff();
        Ok(this)
    }

    fn new(ctx: OrchestratorContext, session_id: Option<String>, state: SessionState) -> Self {
        let shutdown = CancellationToken::new();
        let (revision, _) = watch::channel(0u64);
        let revision = Arc::new(revision);
        let hook = revision.clone();
        let uploads = UploadManager::new(ctx.gateway.clone())
            .with_shutdown(shutdown.clone())
            .with_change_hook(Arc::new(move || {
                hook.send_modify(|rev| *rev = rev.wrapping_add(1));
            }));

        Self {
            inner: Arc::new(Inner {
                ctx,
                session_id,
                state: Mutex::new(state),
                uploads,
                shutdown,
                revision,
                send_lane: tokio::sync::Mutex::new(()),
                created: OnceCell::new(),
                navigated: AtomicBool::new(false),
                polling: Mutex::new(HashSet::new()),
                abandoned: Mutex::new(HashSet::new()),
                settled: Mutex::new(HashSet::new()),
                handoff_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.inner.session_id.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.session_id.is_some()
    }

    pub fn snapshot(&self) -> SessionView {
        let state = self.inner.state.lock();
        SessionView {
            session_id: self.inner.session_id.clone(),
            session: state.session.clone(),
            messages: state.messages.clone(),
            sending: state.sending,
            uploading: state.uploading > 0,
            documents: state.documents.clone(),
            processing_jobs: state.processing.clone(),
            uploads: self.inner.uploads.snapshot(),
        }
    }

    /// Revision counter bumped on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Send a message. Unbound, this creates a session and hands the text
    /// off instead; bound sends run one at a time.
    ///
    /// The user message joins the transcript when its send starts, so a
    /// send queued behind another shows up after the earlier reply.
    #[instrument(skip_all, fields(session_id = ?self.inner.session_id))]
    pub async fn send_message(&self, text: &str) -> Dispatch<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::Dropped;
        }
        match self.inner.session_id.as_deref() {
            Some(session_id) => Dispatch::Done(self.send_bound(session_id, text).await),
            None => {
                self.redirect(|handoff| handoff.set_pending_message(text))
                    .await
            }
        }
    }

    async fn send_bound(&self, session_id: &str, text: &str) -> Message {
        let _lane = self.inner.send_lane.lock().await;
        self.inner.update(|s| s.messages.push(Message::user(text)));
        let _busy = BusyGuard::enter(&self.inner, Busy::Sending);

        match self.inner.ctx.gateway.send_message(session_id, text).await {
            Ok(reply) => {
                debug!(sources = reply.bot_message.source_references.len(), "Reply received");
                let bot = reply.bot_message;
                self.inner.update(|s| {
                    if let (Some(session), Some(count)) = (s.session.as_mut(), reply.message_count) {
                        session.message_count = count;
                    }
                    s.messages.push(bot.clone());
                });
                bot
            }
            Err(e) => {
                warn!(error = %e, "Failed to send message");
                let failure = Message::send_failure();
                self.inner.update(|s| s.messages.push(failure.clone()));
                self.inner
                    .notify(Notification::error("Failed to send message").with_detail(e.to_string()));
                failure
            }
        }
    }

    /// Upload a batch of files. Every file is its own cancelable task; the
    /// call returns once all of them settled and one reconciliation ran.
    #[instrument(skip_all, fields(session_id = ?self.inner.session_id, files = files.len()))]
    pub async fn upload_files(&self, files: Vec<PendingFile>) -> Dispatch<BatchReport> {
        if files.is_empty() {
            return Dispatch::Dropped;
        }
        match self.inner.session_id.as_deref() {
            Some(session_id) => Dispatch::Done(self.upload_bound(session_id, files).await),
            None => {
                self.redirect(move |handoff| handoff.set_pending_files(files))
                    .await
            }
        }
    }

    async fn upload_bound(&self, session_id: &str, files: Vec<PendingFile>) -> BatchReport {
        let _busy = BusyGuard::enter(&self.inner, Busy::Uploading);

        let transfers = files.into_iter().map(|file| {
            let handle = self.inner.uploads.start(session_id, file);
            async move {
                let file_name = handle.file_name.clone();
                let outcome = handle.completion().await;
                self.settle_upload(&file_name, &outcome);
                BatchEntry { file_name, outcome }
            }
        });
        let entries = join_all(transfers).await;

        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Reconciliation after upload batch failed");
        }
        BatchReport { entries }
    }

    fn settle_upload(&self, file_name: &str, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Submitted { job_id } => {
                let job = ProcessingJob::queued(job_id.clone(), file_name);
                self.inner.update(|s| s.track_job(job.clone()));
                self.spawn_poller(job);
            }
            UploadOutcome::Failed { message } => {
                self.inner.notify(
                    Notification::error("Upload failed").with_detail(format!("{}: {}", file_name, message)),
                );
            }
            UploadOutcome::Canceled => {
                self.inner
                    .notify(Notification::info("Upload canceled").with_detail(file_name));
            }
        }
    }

    /// Abort one in-flight upload. Returns false if it already settled.
    pub fn cancel_upload(&self, task_id: TaskId) -> bool {
        self.inner.uploads.cancel(task_id)
    }

    /// Create the session (once, however many intents race for it), stash the
    /// intent and navigate to the new session.
    async fn redirect<T>(&self, stash: impl FnOnce(&HandoffStore)) -> Dispatch<T> {
        let gateway = &self.inner.ctx.gateway;
        let created = self
            .inner
            .created
            .get_or_try_init(|| async { gateway.create_session().await.map(|s| s.id) })
            .await;

        let session_id = match created {
            Ok(id) => id.clone(),
            Err(e) => {
                warn!(error = %e, "Failed to create session");
                self.inner
                    .notify(Notification::error("Could not create chat").with_detail(e.to_string()));
                return Dispatch::Dropped;
            }
        };

        stash(&self.inner.ctx.handoff);
        if !self.inner.navigated.swap(true, Ordering::SeqCst) {
            info!(session_id = %session_id, "Session created, navigating");
            self.inner.ctx.navigator.navigate(&session_id);
        }
        Dispatch::Redirected(session_id)
    }

    /// Replace documents and processing jobs with the server's view and
    /// refresh the session record. Jobs the server reports that nothing is
    /// polling yet get a poll loop.
    #[instrument(skip(self), fields(session_id = ?self.inner.session_id))]
    pub async fn reconcile(&self) -> Result<(), GatewayError> {
        let Some(session_id) = self.inner.session_id.as_deref() else {
            return Ok(());
        };
        let gateway = &self.inner.ctx.gateway;
        let (listing, session) = tokio::join!(
            gateway.list_documents(session_id),
            gateway.get_session(session_id),
        );
        let listing = listing?;
        let session = match session {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                warn!("Session no longer listed by the server");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh session record");
                None
            }
        };

        let settled = self.inner.settled.lock().clone();
        let pending = self.inner.update(|s| {
            s.apply_listing(listing, &settled);
            if session.is_some() {
                s.session = session;
            }
            s.processing.clone()
        });
        for job in pending {
            self.spawn_poller(job);
        }
        Ok(())
    }

    fn resume_polling(&self) {
        let jobs = self.inner.state.lock().processing.clone();
        for job in jobs {
            self.spawn_poller(job);
        }
    }

    fn spawn_poller(&self, job: ProcessingJob) {
        if job.status.is_terminal()
            || self.inner.abandoned.lock().contains(&job.job_id)
            || self.inner.settled.lock().contains(&job.job_id)
        {
            return;
        }
        if !self.inner.polling.lock().insert(job.job_id.clone()) {
            return;
        }
        debug!(job_id = %job.job_id, file = %job.file_name, "Polling job");

        let weak = Arc::downgrade(&self.inner);
        let gateway = self.inner.ctx.gateway.clone();
        let policy = self.inner.ctx.config.poll_policy();
        let token = self.inner.shutdown.child_token();

        tokio::spawn(async move {
            let status_sink = weak.clone();
            let job_id = job.job_id.clone();
            let outcome = poll_job(gateway.as_ref(), &job.job_id, policy, &token, move |status| {
                if let Some(inner) = status_sink.upgrade() {
                    if inner.state.lock().set_job_status(&job_id, status) {
                        inner.bump();
                    }
                }
            })
            .await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            SessionOrchestrator { inner }.finish_job(job, outcome).await;
        });
    }

    async fn finish_job(&self, job: ProcessingJob, outcome: Option<JobOutcome>) {
        match outcome {
            None => debug!(job_id = %job.job_id, "Poll loop stopped"),
            Some(JobOutcome::Done { chunks }) => {
                info!(job_id = %job.job_id, file = %job.file_name, chunks, "Document ready");
                self.inner.settled.lock().insert(job.job_id.clone());
                self.inner.update(|s| s.complete_job(&job, chunks));
                self.inner.notify(
                    Notification::success("Document ready")
                        .with_detail(format!("{} is ready.", job.file_name)),
                );
                if let Err(e) = self.reconcile().await {
                    warn!(error = %e, "Reconciliation after job completion failed");
                }
            }
            Some(other) => {
                match other {
                    JobOutcome::Unreachable { .. } | JobOutcome::TimedOut { .. } => {
                        self.inner.abandoned.lock().insert(job.job_id.clone())
                    }
                    _ => self.inner.settled.lock().insert(job.job_id.clone()),
                };
                let reason = other.failure_message().unwrap_or_default();
                self.inner.update(|s| s.remove_job(&job.job_id));
                self.inner.notify(
                    Notification::error("Processing failed")
                        .with_detail(format!("{}: {}", job.file_name, reason)),
                );
            }
        }
        self.inner.polling.lock().remove(&job.job_id);
        self.inner.bump();
    }

    fn start_sweep(&self) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.child_token();
        let period = self.inner.ctx.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = (SessionOrchestrator { inner }).reconcile().await {
                    warn!(error = %e, "Periodic sync failed");
                }
            }
            debug!("Sweep stopped");
        });
    }

    fn drain_handoff(&self) {
        let handoff = &self.inner.ctx.handoff;
        let mut tasks = Vec::new();
        if let Some(text) = handoff.take_pending_message() {
            debug!("Running handed-off message");
            tasks.push(self.spawn_action(move |this| async move {
                this.send_message(&text).await;
            }));
        }
        if let Some(files) = handoff.take_pending_files() {
            debug!(files = files.len(), "Running handed-off uploads");
            tasks.push(self.spawn_action(move |this| async move {
                this.upload_files(files).await;
            }));
        }
        self.inner.handoff_tasks.lock().extend(tasks);
    }

    fn spawn_action<F, Fut>(&self, action: F) -> JoinHandle<()>
    where
        F: FnOnce(SessionOrchestrator) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.child_token();
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = action(SessionOrchestrator { inner }) => {}
            }
        })
    }

    /// Wait until the intent drained from the handoff store on mount is done.
    pub async fn settle_handoff(&self) {
        let tasks = std::mem::take(&mut *self.inner.handoff_tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Handed-off action failed");
            }
        }
    }

    /// Resolves once no poll loop of this instance is running.
    pub async fn wait_for_jobs(&self) {
        let mut changes = self.subscribe();
        loop {
            if self.inner.polling.lock().is_empty() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    /// Remove a document after the user confirms. Returns whether it was removed.
    #[instrument(skip(self), fields(session_id = ?self.inner.session_id))]
    pub async fn delete_document(&self, name: &str) -> bool {
        let Some(session_id) = self.inner.session_id.as_deref() else {
            return false;
        };
        let prompt = format!("Remove \"{}\" from this chat?", name);
        if !self.inner.ctx.confirm.confirm(&prompt) {
            debug!("Deletion declined");
            return false;
        }

        match self.inner.ctx.gateway.delete_document(session_id, name).await {
            Ok(()) => {
                self.inner.update(|s| s.remove_document(name));
                self.inner
                    .notify(Notification::success("Document removed").with_detail(name));
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to delete document");
                self.inner.notify(
                    Notification::error("Could not remove document")
                        .with_detail(format!("{}: {}", name, e)),
                );
                false
            }
        }
    }

    /// Stop the sweep, every poll loop and every in-flight upload.
    pub fn teardown(&self) {
        debug!(session_id = ?self.inner.session_id, "Tearing down");
        self.inner.shutdown.cancel();
    }
}
