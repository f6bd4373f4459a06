//! Executes one [`CliCommand`] against a [`CliHost`] and emits JSON values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use docchat_core::models::PendingFile;
use docchat_core::{Dispatch, LoadStatus, SessionOrchestrator, SessionView};
use serde_json::{json, Value};
use tracing::debug;

use super::command::CliCommand;
use super::host::CliHost;

/// Run `command`. One-shot commands emit a single value; `watch` emits one
/// per change.
pub async fn run(host: &CliHost, command: CliCommand, emit: &mut dyn FnMut(&Value)) -> Result<()> {
    debug!(command = command.name(), "Running command");
    match command {
        CliCommand::ListSessions => {
            let directory = host.directory();
            if directory.fetch().await == LoadStatus::Failed {
                let error = directory.snapshot().error.unwrap_or_default();
                bail!("Failed to load sessions: {}", error);
            }
            emit(&serde_json::to_value(directory.sessions())?);
        }
        CliCommand::CreateSession => {
            let session = host
                .directory()
                .create()
                .await
                .context("Session could not be created")?;
            emit(&serde_json::to_value(session)?);
        }
        CliCommand::DeleteSession { session_id } => {
            let directory = host.directory();
            directory.fetch().await;
            let deleted = directory.delete(&session_id).await;
            emit(&with_notifications(host, json!({ "sessionId": session_id, "deleted": deleted })));
        }
        CliCommand::RenameSession { session_id, title } => {
            let renamed = host.directory().rename(&session_id, &title).await;
            emit(&with_notifications(host, json!({ "sessionId": session_id, "renamed": renamed })));
        }
        CliCommand::ListMessages { session_id } => {
            let view = snapshot_of(host, &session_id).await?;
            emit(&serde_json::to_value(view.messages)?);
        }
        CliCommand::ListDocuments { session_id } => {
            let view = snapshot_of(host, &session_id).await?;
            emit(&json!({
                "sessionId": session_id,
                "documents": view.documents,
                "processing": view.processing_jobs,
            }));
        }
        CliCommand::SendMessage { session_id, text } => {
            let value = send(host, session_id, &text).await?;
            emit(&with_notifications(host, value));
        }
        CliCommand::Upload {
            session_id,
            files,
            wait,
        } => {
            let value = upload(host, session_id, files, wait).await?;
            emit(&with_notifications(host, value));
        }
        CliCommand::DeleteDocument { session_id, name } => {
            let orch = host.open(Some(session_id.clone())).await?;
            let removed = orch.delete_document(&name).await;
            orch.teardown();
            emit(&with_notifications(
                host,
                json!({ "sessionId": session_id, "name": name, "removed": removed }),
            ));
        }
        CliCommand::Watch {
            session_id,
            duration,
        } => watch(host, session_id, duration, emit).await?,
    }
    Ok(())
}

async fn snapshot_of(host: &CliHost, session_id: &str) -> Result<SessionView> {
    let orch = host.open(Some(session_id.to_string())).await?;
    let view = orch.snapshot();
    orch.teardown();
    Ok(view)
}

async fn send(host: &CliHost, session_id: Option<String>, text: &str) -> Result<Value> {
    let orch = host.open(session_id).await?;
    let orch = match orch.send_message(text).await {
        Dispatch::Done(_) => orch,
        Dispatch::Redirected(_) => host.follow(orch).await?,
        Dispatch::Dropped => {
            orch.teardown();
            bail!("Message was not sent");
        }
    };

    let view = orch.snapshot();
    orch.teardown();
    Ok(json!({
        "sessionId": view.session_id,
        "reply": view.messages.last(),
        "messageCount": view.messages.len(),
    }))
}

async fn upload(
    host: &CliHost,
    session_id: Option<String>,
    paths: Vec<PathBuf>,
    wait: bool,
) -> Result<Value> {
    if paths.is_empty() {
        bail!("No files given");
    }
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(PendingFile::from_path(path).await?);
    }

    let orch = host.open(session_id).await?;
    let (orch, batch) = match orch.upload_files(files).await {
        Dispatch::Done(report) => (orch, Some(report)),
        Dispatch::Redirected(_) => (host.follow(orch).await?, None),
        Dispatch::Dropped => {
            orch.teardown();
            bail!("Upload was not started");
        }
    };

    if wait {
        orch.wait_for_jobs().await;
    }
    let view = orch.snapshot();
    orch.teardown();
    Ok(json!({
        "sessionId": view.session_id,
        "batch": batch,
        "documents": view.documents,
        "processing": view.processing_jobs,
    }))
}

async fn watch(
    host: &CliHost,
    session_id: String,
    duration: Option<Duration>,
    emit: &mut dyn FnMut(&Value),
) -> Result<()> {
    let orch = host.open(Some(session_id)).await?;
    let result = watch_loop(&orch, duration, emit).await;
    orch.teardown();
    result
}

async fn watch_loop(
    orch: &SessionOrchestrator,
    duration: Option<Duration>,
    emit: &mut dyn FnMut(&Value),
) -> Result<()> {
    let mut changes = orch.subscribe();
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    emit(&serde_json::to_value(orch.snapshot())?);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                emit(&serde_json::to_value(orch.snapshot())?);
            }
        }
    }
    Ok(())
}

fn with_notifications(host: &CliHost, mut value: Value) -> Value {
    let notifications = host.notifications();
    if !notifications.is_empty() {
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "notifications".to_string(),
                serde_json::to_value(notifications).unwrap_or(Value::Null),
            );
        }
    }
    value
}
