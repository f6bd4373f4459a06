/// Failure of a single gateway request. No retries happen at this layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Non-success HTTP status. `message` is the server's `error` field when
    /// it sent one, otherwise a generic status-coded message.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn status(status: u16, server_message: Option<String>) -> Self {
        let message = server_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        GatewayError::Status { status, message }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
            GatewayError::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_prefers_server_message() {
        let err = GatewayError::status(422, Some("PDF is encrypted".to_string()));
        assert_eq!(err.to_string(), "PDF is encrypted");
        assert_eq!(err.status_code(), Some(422));
    }

    #[test]
    fn test_status_falls_back_to_generic_message() {
        let err = GatewayError::status(503, None);
        assert_eq!(err.to_string(), "Request failed with status 503");

        let blank = GatewayError::status(500, Some("  ".to_string()));
        assert_eq!(blank.to_string(), "Request failed with status 500");
    }

    #[test]
    fn test_not_found() {
        assert!(GatewayError::status(404, None).is_not_found());
        assert!(!GatewayError::Decode("bad json".into()).is_not_found());
    }
}
