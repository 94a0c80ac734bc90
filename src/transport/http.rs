//! HTTP transport streaming file bytes to an ingestion endpoint.

use super::{
    ProgressReporter, Transport, TransportError, TransportRequest, UploadControl, UploadReceipt,
};
use crate::config::Config;
use async_trait::async_trait;
use futures_core::Stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde_json::Value;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;
const MAX_PLAIN_ERROR_LEN: usize = 200;

/// Transport posting each document as a raw request body.
///
/// File metadata travels in the query string (`fileName`, `documentType`, `title`); the
/// endpoint answers with `{"url": "..."}`. Non-success responses are mapped to
/// [`TransportError::Rejected`] carrying the server's `message` or `error` field.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Build a transport for `endpoint`, optionally authenticating with a bearer token.
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, TransportError> {
        let endpoint = normalize_endpoint(endpoint).map_err(TransportError::InvalidEndpoint)?;
        let client = Client::builder().user_agent("docflow/0.1").build()?;
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        tracing::debug!(
            endpoint = %endpoint,
            has_api_key = api_key.is_some(),
            "Initialized upload HTTP transport"
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Build a transport from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let endpoint = config
            .require_endpoint()
            .map_err(|error| TransportError::InvalidEndpoint(error.to_string()))?;
        Self::new(endpoint, config.upload_api_key.clone())
    }

    /// Endpoint uploads are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        request: TransportRequest,
        progress: ProgressReporter,
    ) -> Result<UploadReceipt, TransportError> {
        let data = request.file.read_all().await?;
        let total = data.len() as u64;
        let mut builder = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("fileName", request.file.name()),
                ("documentType", request.document_type.as_tag()),
                ("title", request.title.as_str()),
            ])
            .header(CONTENT_TYPE, request.file.mime_type())
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(chunked_body(data, progress.clone())));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = TransportError::Rejected {
                status: Some(status.as_u16()),
                message: extract_error_message(&body),
            };
            tracing::warn!(file = request.file.name(), error = %error, "Upload rejected");
            return Err(error);
        }

        let receipt: UploadReceipt = response.json().await?;
        if receipt.url.trim().is_empty() {
            return Err(TransportError::Rejected {
                status: Some(status.as_u16()),
                message: Some("Upload response did not include a document URL".to_string()),
            });
        }
        progress.report(100.0);
        Ok(receipt)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(
        &self,
        request: TransportRequest,
        control: UploadControl,
    ) -> Result<UploadReceipt, TransportError> {
        let UploadControl { cancel, progress } = control;
        let file_name = request.file.name().to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(file = %file_name, "Upload request aborted");
                Err(TransportError::Cancelled)
            }
            result = self.send(request, progress) => result,
        }
    }
}

/// Yield the payload in fixed-size chunks, reporting the share sent after each one.
fn chunked_body(
    data: Vec<u8>,
    progress: ProgressReporter,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let total = data.len();
        if total == 0 {
            return;
        }
        let mut sent = 0usize;
        for chunk in data.chunks(UPLOAD_CHUNK_BYTES) {
            sent += chunk.len();
            yield Ok(chunk.to_vec());
            progress.report(sent as f64 / total as f64 * 100.0);
        }
    }
}

/// Pull a human-readable message out of an error body.
fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
    }
    (trimmed.len() <= MAX_PLAIN_ERROR_LEN && !trimmed.starts_with('<')).then(|| trimmed.to_string())
}

fn normalize_endpoint(url: &str) -> Result<String, String> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|err| err.to_string())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}
