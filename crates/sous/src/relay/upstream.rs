//! Upstream connector for OpenAI-compatible streaming chat completions
//!
//! Opens one streaming request per relay. Handshake failures are returned
//! synchronously with the provider's status and body; on success the caller
//! gets the raw response byte stream. Dropping the stream closes the
//! connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::error::UpstreamError;
use super::request::{ChatRequest, Message};
use crate::config::UpstreamConfig;
use crate::error::{Result, SousError};

/// Live byte stream from the provider, arbitrarily chunked
pub type ByteSource = BoxStream<'static, std::result::Result<Bytes, UpstreamError>>;

/// Opens streaming connections to a model provider
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ByteSource, UpstreamError>;
}

/// Streaming chat completion request body
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Connector for any OpenAI-compatible `/chat/completions` endpoint (Groq by default)
#[derive(Debug, Clone)]
pub struct OpenAiConnector {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiConnector {
    /// Build a connector from config, reading the API key from the configured env var
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(config, api_key)
    }

    /// Build a connector with an explicit API key
    pub fn new(config: &UpstreamConfig, api_key: impl Into<String>) -> Result<Self> {
        // Connect timeout only: a whole-request timeout would cut long answers
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SousError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.completions_url()?,
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl UpstreamConnector for OpenAiConnector {
    async fn connect(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ByteSource, UpstreamError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: request.conversation(),
            stream: true,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Opening upstream stream to {} ({} messages)",
            self.endpoint,
            body.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Network(format!("Request timed out: {e}"))
                } else if e.is_connect() {
                    UpstreamError::Network(format!("Failed to connect to provider: {e}"))
                } else {
                    UpstreamError::Network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| UpstreamError::Read(e.to_string()))
            .boxed())
    }
}
