use std::path::PathBuf;
use std::time::Duration;

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// List all chat sessions
    ListSessions,
    /// Create an empty session
    CreateSession,
    DeleteSession { session_id: String },
    RenameSession { session_id: String, title: String },
    /// Print a session's transcript
    ListMessages { session_id: String },
    /// Send a message; without a session one is created first
    SendMessage {
        session_id: Option<String>,
        text: String,
    },
    /// Upload files; with `wait`, block until their processing jobs finish
    Upload {
        session_id: Option<String>,
        files: Vec<PathBuf>,
        wait: bool,
    },
    /// Documents and processing jobs of a session
    ListDocuments { session_id: String },
    DeleteDocument { session_id: String, name: String },
    /// Print the session view on every change
    Watch {
        session_id: String,
        duration: Option<Duration>,
    },
}

impl CliCommand {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            CliCommand::ListSessions => "list",
            CliCommand::CreateSession => "create",
            CliCommand::DeleteSession { .. } => "delete",
            CliCommand::RenameSession { .. } => "rename",
            CliCommand::ListMessages { .. } => "messages",
            CliCommand::SendMessage { .. } => "send",
            CliCommand::Upload { .. } => "upload",
            CliCommand::ListDocuments { .. } => "docs",
            CliCommand::DeleteDocument { .. } => "rm-doc",
            CliCommand::Watch { .. } => "watch",
        }
    }
}
