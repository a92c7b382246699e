//! Streaming HTTP client for the generative-search API.
//!
//! Opens a server-sent-events generation call with the google-search
//! grounding tool enabled, and turns the SSE frames into normalized
//! [`StreamEvent`]s. Auth and transport details stay inside this module.

use super::response::RawStreamResponse;
use super::{EventStream, GenerateRequest, GenerativeProvider, ProviderError, StreamEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default base URL for the generative-search API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider client configuration.
#[derive(Debug, Clone)]
pub struct GenAiConfig {
    /// API key; absent means the provider is unconfigured.
    pub api_key: Option<String>,
    /// Base URL (default: the hosted generative-language endpoint).
    pub base_url: String,
    /// Request timeout (default: 30s).
    pub timeout: Duration,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self { api_key: None, base_url: DEFAULT_BASE_URL.to_string(), timeout: DEFAULT_TIMEOUT }
    }
}

impl GenAiConfig {
    /// Build from loaded application configuration.
    pub fn from_app(config: &citeflow_core::AppConfig) -> Self {
        Self { api_key: config.api_key.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// Buffers partial SSE lines across network chunks and yields completed
/// `data:` payloads.
///
/// The buffer holds raw bytes and splits on `\n` in byte space; only
/// completed lines are decoded, so a multi-byte character split across
/// network chunks stays intact.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed raw stream bytes; returns the data payloads of every line
    /// completed by this chunk.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);

            if let Some(data) = line.trim().strip_prefix("data: ")
                && data != "[DONE]"
            {
                payloads.push(data.to_string());
            }
        }
        payloads
    }
}

/// Streaming generative-search API client.
#[derive(Debug, Clone)]
pub struct GenAiClient {
    http: reqwest::Client,
    config: GenAiConfig,
}

impl GenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: GenAiConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Request body for one streaming generation call.
    fn build_body(request: &GenerateRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
            "tools": [{"googleSearch": {}}],
            "generationConfig": {"temperature": request.temperature},
        });
        if let Some(instructions) = &request.instructions {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": instructions}]});
        }
        body
    }
}

#[async_trait]
impl GenerativeProvider for GenAiClient {
    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<EventStream, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ProviderError::MissingApiKey)?;

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, request.model_name
        );

        tracing::debug!(model = %request.model_name, "opening streaming generation call");

        let http_response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Accept", "text/event-stream")
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = http_response.status();
        tracing::debug!(status = %status, "provider response status");

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }
        if status == 429 {
            return Err(ProviderError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::HttpError { status: status.as_u16() });
        }

        let (tx, rx) = mpsc::unbounded_channel::<Result<StreamEvent, ProviderError>>();

        tokio::spawn(async move {
            let mut bytes = http_response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::from(e)));
                        return;
                    }
                };

                for payload in lines.push(&chunk) {
                    match serde_json::from_str::<RawStreamResponse>(&payload) {
                        Ok(raw) => {
                            let event = raw.into_event();
                            if event.text.is_some() || event.grounding.is_some() {
                                if tx.send(Ok(event)).is_err() {
                                    return; // consumer gone
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping unparseable stream frame");
                        }
                    }
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
