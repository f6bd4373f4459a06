//! Terminal implementations of the core's host seams.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use docchat_core::{
    Confirm, CoreConfig, Gateway, HandoffStore, Navigator, Notification, NotificationLog, Notifier,
    OrchestratorContext, SessionDirectory, SessionOrchestrator,
};
use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info};

/// Prints notifications to stderr and keeps them for the command's output.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier {
    log: NotificationLog,
    quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self {
            log: NotificationLog::new(),
            quiet,
        }
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.log.drain()
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        if !self.quiet {
            match &notification.detail {
                Some(detail) => eprintln!(
                    "{} {}: {}",
                    notification.level.icon(),
                    notification.title,
                    detail
                ),
                None => eprintln!("{} {}", notification.level.icon(), notification.title),
            }
        }
        self.log.notify(notification);
    }
}

/// `[y/N]` prompt on stdin, or unconditional yes with `--yes`
#[derive(Debug, Clone, Copy)]
pub struct StdinConfirm {
    pub assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{} [y/N] ", prompt);
        if let Err(e) = std::io::stderr().flush() {
            debug!(error = %e, "Failed to flush prompt");
        }

        let multi_thread = Handle::try_current()
            .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if multi_thread {
            tokio::task::block_in_place(read_answer)
        } else {
            read_answer()
        }
    }
}

fn read_answer() -> bool {
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(e) => {
            debug!(error = %e, "Failed to read confirmation");
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Remembers where the core asked to navigate; the host mounts it.
#[derive(Debug, Default)]
pub struct RedirectRecorder {
    target: Mutex<Option<String>>,
}

impl RedirectRecorder {
    pub fn take(&self) -> Option<String> {
        self.target.lock().take()
    }
}

impl Navigator for RedirectRecorder {
    fn navigate(&self, session_id: &str) {
        *self.target.lock() = Some(session_id.to_string());
    }
}

/// Owns the shared context and plays the router for the orchestrators it mounts.
pub struct CliHost {
    ctx: OrchestratorContext,
    notifier: ConsoleNotifier,
    redirects: Arc<RedirectRecorder>,
}

impl CliHost {
    pub fn new(gateway: Arc<dyn Gateway>, config: CoreConfig, assume_yes: bool, quiet: bool) -> Self {
        let notifier = ConsoleNotifier::new(quiet);
        let redirects = Arc::new(RedirectRecorder::default());
        let ctx = OrchestratorContext::new(gateway, config)
            .with_handoff(HandoffStore::new())
            .with_notifier(Arc::new(notifier.clone()))
            .with_navigator(redirects.clone())
            .with_confirm(Arc::new(StdinConfirm { assume_yes }));
        Self {
            ctx,
            notifier,
            redirects,
        }
    }

    pub async fn open(&self, session_id: Option<String>) -> Result<SessionOrchestrator> {
        Ok(SessionOrchestrator::mount(self.ctx.clone(), session_id).await?)
    }

    /// If the orchestrator asked to navigate, tear it down and mount the
    /// target, which picks up the handed-off intent.
    pub async fn follow(&self, current: SessionOrchestrator) -> Result<SessionOrchestrator> {
        match self.redirects.take() {
            Some(target) => {
                info!(session_id = %target, "Following redirect");
                current.teardown();
                let next = self.open(Some(target)).await?;
                next.settle_handoff().await;
                Ok(next)
            }
            None => Ok(current),
        }
    }

    pub fn directory(&self) -> SessionDirectory {
        SessionDirectory::new(
            self.ctx.gateway.clone(),
            self.ctx.notifier.clone(),
            self.ctx.confirm.clone(),
        )
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifier.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::NotificationLevel;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_assume_yes_skips_prompt() {
        assert!(StdinConfirm { assume_yes: true }.confirm("Delete?"));
    }

    #[test]
    fn test_redirect_is_taken_once() {
        let recorder = RedirectRecorder::default();
        recorder.navigate("c1");
        recorder.navigate("c2");
        assert_eq!(recorder.take().as_deref(), Some("c2"));
        assert_eq!(recorder.take(), None);
    }

    #[test]
    fn test_console_notifier_keeps_entries() {
        let notifier = ConsoleNotifier::new(true);
        notifier.notify(Notification::warning("Slow network"));
        let drained = notifier.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].level, NotificationLevel::Warning);
        assert!(notifier.drain().is_empty());
    }
}
