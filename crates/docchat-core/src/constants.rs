//! Application-wide constants
//!
//! Defaults for the remote service and the timers that drive polling
//! and reconciliation.

/// Default base URL of the chat/document service
pub const DEFAULT_API_BASE: &str = "http://localhost:5050/api";

/// Delay between two status checks of the same processing job
pub const POLL_INTERVAL_MS: u64 = 2_000;

/// Upper bound on the poll delay when a backoff multiplier is configured
pub const POLL_MAX_INTERVAL_MS: u64 = 30_000;

/// Status checks allowed per job before the poll loop gives up (30 minutes at 2s)
pub const POLL_MAX_ATTEMPTS: u32 = 900;

/// Largest accepted poll delay multiplier
pub const POLL_MAX_BACKOFF: f64 = 10.0;

/// Interval of the unconditional session/document re-fetch
pub const SWEEP_INTERVAL_MS: u64 = 5_000;

/// Per-request timeout for gateway calls
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Size of the chunks an upload body is streamed in (progress granularity)
pub const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

// Transcript defaults
pub const ERROR_REPLY_TEXT: &str = "Sorry, an error occurred.";
pub const DEFAULT_SESSION_TITLE: &str = "Chat";

// Environment variables
pub mod env {
    /// Overrides the configured API base URL
    pub const API_BASE: &str = "DOCCHAT_API_BASE";
    /// Log filter directive (EnvFilter syntax)
    pub const LOG: &str = "DOCCHAT_LOG";
    /// Path of an optional plain-text log file
    pub const LOG_FILE: &str = "DOCCHAT_LOG_FILE";
}
