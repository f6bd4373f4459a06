use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ERROR_REPLY_TEXT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A passage of an indexed document the bot cited in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub id: u32,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    /// Page label as the server renders it ("3", "iv", "3-4")
    #[serde(default, deserialize_with = "page_label")]
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub has_context: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_references: Vec<SourceReference>,
}

impl Message {
    /// Optimistic local copy of what the user typed
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            text: text.into(),
            sender: Sender::User,
            timestamp: now_timestamp(),
            is_error: false,
            has_context: false,
            source_references: Vec::new(),
        }
    }

    /// Bot reply; the context flag follows from whether any sources were cited
    pub fn bot(text: impl Into<String>, sources: Vec<SourceReference>) -> Self {
        Self {
            id: new_message_id(),
            text: text.into(),
            sender: Sender::Bot,
            timestamp: now_timestamp(),
            is_error: false,
            has_context: !sources.is_empty(),
            source_references: sources,
        }
    }

    /// Synthetic transcript entry appended when a send fails
    pub fn send_failure() -> Self {
        Self {
            is_error: true,
            ..Self::bot(ERROR_REPLY_TEXT, Vec::new())
        }
    }
}

fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn page_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
