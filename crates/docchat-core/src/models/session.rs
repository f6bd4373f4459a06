use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SESSION_TITLE;

/// One chat conversation as the server describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Opaque server timestamp, only used for display ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default, alias = "has_pdf")]
    pub has_documents: bool,
    #[serde(default, alias = "pdf_count", skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u32>,
}

impl Session {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            DEFAULT_SESSION_TITLE
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_legacy_pdf_fields() {
        let json = r#"{
            "id": "c1",
            "title": "Quarterly report",
            "updated_at": "2024-05-01T10:00:00",
            "message_count": 4,
            "has_pdf": true,
            "pdf_count": 2
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, "c1");
        assert!(session.has_documents);
        assert_eq!(session.document_count, Some(2));
        assert_eq!(session.message_count, 4);
    }

    #[test]
    fn test_display_title_falls_back() {
        let session: Session = serde_json::from_str(r#"{"id": "c2"}"#).unwrap();
        assert_eq!(session.display_title(), "Chat");
        assert!(!session.has_documents);
    }
}
