use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docchat_cli::cli::{run, CliCommand, CliConfig, CliHost};
use docchat_core::{tracing_setup, HttpGateway};

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Chat with your documents from the terminal")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pretty: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, short, global = true)]
    yes: bool,

    /// Do not echo notifications to stderr
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Path to JSON config file (apiBase, poll and sweep timings, defaultSession)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Base URL of the service, overrides the config file and DOCCHAT_API_BASE
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Session to act on
    #[arg(long, short = 's', global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all chat sessions
    List,

    /// Create an empty session
    Create,

    /// Delete a session (asks for confirmation)
    Delete,

    /// Rename a session
    Rename {
        /// New title
        title: String,
    },

    /// Print the transcript of a session
    Messages,

    /// Send a message; creates a session when none is given
    Send {
        /// Message text
        text: String,
    },

    /// Upload documents; creates a session when none is given
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Wait until the server finished processing them
        #[arg(long, short)]
        wait: bool,
    },

    /// List documents and processing jobs
    Docs,

    /// Remove a document (asks for confirmation)
    RmDoc {
        /// Document name
        name: String,
    },

    /// Print the session view every time it changes
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    tracing_setup::init_tracing()?;

    let config = CliConfig::resolve(cli.config.as_deref(), cli.api_base.as_deref())?;
    let session = cli.session.or_else(|| config.default_session.clone());

    let require_session = || {
        session
            .clone()
            .context("No session given. Pass --session or set defaultSession in the config file")
    };

    // Convert subcommand to CliCommand
    let command = match cli.command {
        Some(Commands::List) => CliCommand::ListSessions,
        Some(Commands::Create) => CliCommand::CreateSession,
        Some(Commands::Delete) => CliCommand::DeleteSession {
            session_id: require_session()?,
        },
        Some(Commands::Rename { title }) => CliCommand::RenameSession {
            session_id: require_session()?,
            title,
        },
        Some(Commands::Messages) => CliCommand::ListMessages {
            session_id: require_session()?,
        },
        Some(Commands::Send { text }) => CliCommand::SendMessage {
            session_id: session.clone(),
            text,
        },
        Some(Commands::Upload { files, wait }) => CliCommand::Upload {
            session_id: session.clone(),
            files,
            wait,
        },
        Some(Commands::Docs) => CliCommand::ListDocuments {
            session_id: require_session()?,
        },
        Some(Commands::RmDoc { name }) => CliCommand::DeleteDocument {
            session_id: require_session()?,
            name,
        },
        Some(Commands::Watch { seconds }) => CliCommand::Watch {
            session_id: require_session()?,
            duration: seconds.map(Duration::from_secs),
        },
        None => {
            eprintln!("No command specified. Use --help for usage.");
            std::process::exit(1);
        }
    };

    let gateway = HttpGateway::new(&config.core)?;
    let host = CliHost::new(Arc::new(gateway), config.core.clone(), cli.yes, cli.quiet);
    let pretty = cli.pretty;

    let mut failed_render = None;
    run(&host, command, &mut |value: &serde_json::Value| match render(value, pretty) {
        Ok(line) => println!("{}", line),
        Err(e) => failed_render = Some(e),
    })
    .await?;

    match failed_render {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn render(value: &serde_json::Value, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.context("Failed to render output")
}
