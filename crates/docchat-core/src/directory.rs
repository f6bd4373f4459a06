//! The list of chat sessions shown next to the conversation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::gateway::Gateway;
use crate::host::Confirm;
use crate::models::Session;
use crate::notify::{Notification, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryView {
    pub sessions: Vec<Session>,
    pub status: LoadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SessionDirectory {
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn Notifier>,
    confirm: Arc<dyn Confirm>,
    view: Mutex<DirectoryView>,
}

impl SessionDirectory {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn Notifier>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            gateway,
            notifier,
            confirm,
            view: Mutex::new(DirectoryView::default()),
        }
    }

    pub fn snapshot(&self) -> DirectoryView {
        self.view.lock().clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.view.lock().sessions.clone()
    }

    pub fn status(&self) -> LoadStatus {
        self.view.lock().status
    }

    pub async fn fetch(&self) -> LoadStatus {
        {
            let mut view = self.view.lock();
            view.status = LoadStatus::Loading;
            view.error = None;
        }
        let result = self.gateway.list_sessions().await;
        let mut view = self.view.lock();
        match result {
            Ok(sessions) => {
                debug!(count = sessions.len(), "Sessions loaded");
                view.sessions = sessions;
                view.status = LoadStatus::Succeeded;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load sessions");
                view.status = LoadStatus::Failed;
                view.error = Some(e.to_string());
            }
        }
        view.status
    }

    /// Seed the list from data fetched elsewhere. Ignored once the list has entries.
    pub fn hydrate(&self, sessions: Vec<Session>) -> bool {
        let mut view = self.view.lock();
        if !view.sessions.is_empty() {
            return false;
        }
        view.sessions = sessions;
        view.status = LoadStatus::Succeeded;
        true
    }

    /// Create a session and put it at the top of the list
    pub async fn create(&self) -> Option<Session> {
        match self.gateway.create_session().await {
            Ok(session) => {
                self.view.lock().sessions.insert(0, session.clone());
                Some(session)
            }
            Err(e) => {
                warn!(error = %e, "Failed to create session");
                self.notifier
                    .notify(Notification::error("Could not create chat").with_detail(e.to_string()));
                None
            }
        }
    }

    pub async fn delete(&self, session_id: &str) -> bool {
        let title = self
            .view
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.display_title().to_string())
            .unwrap_or_else(|| session_id.to_string());
        if !self
            .confirm
            .confirm(&format!("Delete \"{}\"? This cannot be undone.", title))
        {
            return false;
        }

        match self.gateway.delete_session(session_id).await {
            Ok(()) => {
                self.view.lock().sessions.retain(|s| s.id != session_id);
                self.notifier
                    .notify(Notification::success("Chat deleted").with_detail(title));
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to delete session");
                self.notifier
                    .notify(Notification::error("Could not delete chat").with_detail(e.to_string()));
                false
            }
        }
    }

    pub async fn rename(&self, session_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        match self.gateway.rename_session(session_id, title).await {
            Ok(()) => {
                if let Some(session) = self
                    .view
                    .lock()
                    .sessions
                    .iter_mut()
                    .find(|s| s.id == session_id)
                {
                    session.title = title.to_string();
                }
                self.notifier.notify(Notification::success("Chat renamed"));
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to rename session");
                self.notifier
                    .notify(Notification::error("Could not rename chat").with_detail(e.to_string()));
                false
            }
        }
    }
}
