use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    DocumentListing, Gateway, JobStatusReport, ProgressFn, SendReply, SubmitReceipt,
};
use crate::config::{normalize_api_base, CoreConfig};
use crate::error::{CoreError, GatewayError};
use crate::models::{Message, PendingFile, Session, SourceReference};

/// Multipart field the service reads the uploaded file from
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    reply: String,
    #[serde(default)]
    sources: Vec<SourceReference>,
    #[serde(default)]
    message_count: Option<u32>,
}

/// `reqwest` implementation of the gateway contract
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base: Url,
    request_timeout: Duration,
    upload_chunk_bytes: usize,
}

impl HttpGateway {
    pub fn new(config: &CoreConfig) -> Result<Self, CoreError> {
        let api_base =
            normalize_api_base(&config.api_base).map_err(|e| CoreError::Config(e.to_string()))?;
        let base = Url::parse(&api_base)
            .map_err(|e| CoreError::Config(format!("Invalid API base URL {}: {}", api_base, e)))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            request_timeout: config.request_timeout(),
            upload_chunk_bytes: config.upload_chunk_bytes.max(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments to the base, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.timeout(self.request_timeout).send().await?;
        check_status(response).await
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.execute(request).await?;
        read_json(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let server_message = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error);
    debug!(status = status.as_u16(), ?server_message, "Gateway request rejected");
    Err(GatewayError::status(status.as_u16(), server_message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) * 100) / total) as u8
}

/// Stream `bytes` in chunks, reporting progress as each chunk is handed over.
fn progress_body(bytes: Bytes, chunk_bytes: usize, progress: ProgressFn) -> reqwest::Body {
    let total = bytes.len();
    if total == 0 {
        progress(100);
    }
    let chunks: Vec<Bytes> = (0..total)
        .step_by(chunk_bytes)
        .map(|start| bytes.slice(start..(start + chunk_bytes).min(total)))
        .collect();

    let mut sent = 0usize;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        progress(percent(sent, total));
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

#[async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list_sessions(&self) -> Result<Vec<Session>, GatewayError> {
        self.fetch_json(self.client.get(self.endpoint(&["sessions"])))
            .await
    }

    #[instrument(skip(self))]
    async fn create_session(&self) -> Result<Session, GatewayError> {
        self.fetch_json(self.client.post(self.endpoint(&["sessions"])))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.execute(self.client.delete(self.endpoint(&["sessions", session_id])))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .put(self.endpoint(&["sessions", session_id, "rename"]))
            .json(&serde_json::json!({ "title": title }));
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, GatewayError> {
        self.fetch_json(self.client.get(self.endpoint(&["sessions", session_id, "messages"])))
            .await
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send_message(&self, session_id: &str, text: &str) -> Result<SendReply, GatewayError> {
        let request = self
            .client
            .post(self.endpoint(&["sessions", session_id, "messages"]))
            .json(&serde_json::json!({ "text": text }));
        let reply: WireReply = self.fetch_json(request).await?;

        Ok(SendReply {
            bot_message: Message::bot(reply.reply, reply.sources),
            message_count: reply.message_count,
        })
    }

    #[instrument(skip(self))]
    async fn list_documents(&self, session_id: &str) -> Result<DocumentListing, GatewayError> {
        self.fetch_json(self.client.get(self.endpoint(&["sessions", session_id, "documents"])))
            .await
    }

    #[instrument(skip(self, file, progress), fields(file_name = %file.name, bytes = file.len()))]
    async fn submit_document(
        &self,
        session_id: &str,
        file: &PendingFile,
        progress: ProgressFn,
    ) -> Result<SubmitReceipt, GatewayError> {
        let body = progress_body(file.bytes.clone(), self.upload_chunk_bytes, progress);
        let mut part = reqwest::multipart::Part::stream_with_length(body, file.len())
            .file_name(file.name.clone());
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime)?;
        }
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        // No overall timeout: large files may legitimately take longer than a
        // regular request. Cancellation is the caller's job.
        let response = self
            .client
            .post(self.endpoint(&["sessions", session_id, "documents"]))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        read_json(response).await
    }

    #[instrument(skip(self))]
    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, GatewayError> {
        self.fetch_json(self.client.get(self.endpoint(&["jobs", job_id])))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, session_id: &str, name: &str) -> Result<(), GatewayError> {
        self.execute(
            self.client
                .delete(self.endpoint(&["sessions", session_id, "documents", name])),
        )
        .await?;
        Ok(())
    }
}
