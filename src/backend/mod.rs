//! Backend module - wire clients for the supported protocols and the host registry
//!
//! Every host is bound to exactly one [`BackendClient`]. The two implementations
//! speak different wire protocols but expose the same capability set, so the
//! registry and the health manager never need to know which one they hold.

pub mod ollama;
pub mod openai;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendType, Host};
use crate::error::{AppError, Result};

pub use ollama::OllamaClient;
pub use openai::OpenAICompatibleClient;
pub use registry::HostRegistry;

/// A model as reported by a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Model {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modified_at: None,
            size: None,
        }
    }
}

/// Sampling options understood by both protocols
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Context window size (native protocol only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl GenerateOptions {
    pub fn is_empty(&self) -> bool {
        self.max_tokens.is_none() && self.temperature.is_none() && self.num_ctx.is_none()
    }
}

/// Single-turn generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Durations reported by the server itself, when the protocol exposes them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTimings {
    pub total: Option<Duration>,
    /// Time spent loading the model into memory
    pub load: Option<Duration>,
    pub prompt_eval: Option<Duration>,
    pub eval: Option<Duration>,
}

/// Protocol-independent generation result
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub model: String,
    pub text: String,
    /// Zero when the protocol does not report usage
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Wall-clock time of the round trip
    pub duration: Duration,
    pub done: bool,
    pub timings: ServerTimings,
}

impl GenerateResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Generation speed
    ///
    /// Uses the server-reported eval time when available, otherwise the
    /// wall-clock round trip (which includes model load and transport).
    pub fn tokens_per_second(&self) -> f64 {
        let elapsed = self
            .timings
            .eval
            .filter(|d| !d.is_zero())
            .unwrap_or(self.duration);
        rate(self.completion_tokens, elapsed)
    }

    /// Prompt processing speed; zero when the server does not report it
    pub fn prompt_tokens_per_second(&self) -> f64 {
        self.timings
            .prompt_eval
            .map_or(0.0, |elapsed| rate(self.prompt_tokens, elapsed))
    }
}

fn rate(tokens: u32, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        f64::from(tokens) / secs
    } else {
        0.0
    }
}

/// One incremental piece of a streamed generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateChunk {
    /// Text delta
    pub text: String,
    /// Set on the final chunk
    pub done: bool,
    pub model: Option<String>,
    /// Usage figures, usually only on the final chunk
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub timings: ServerTimings,
}

/// Stream of generation chunks
pub type GenerateStream = Pin<Box<dyn Stream<Item = Result<GenerateChunk>> + Send>>;

/// Capability set shared by every wire protocol
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Protocol this client speaks
    fn backend_type(&self) -> BackendType;

    /// Base URL of the host
    fn base_url(&self) -> &str;

    /// Single-turn completion
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Single-turn completion delivered incrementally
    ///
    /// Transport and status errors are returned before the stream starts;
    /// errors while reading the body arrive as stream items.
    async fn generate_stream(&self, request: GenerateRequest) -> Result<GenerateStream>;

    /// Models currently available on the host
    ///
    /// An error means "unknown", not "no models".
    async fn list_models(&self) -> Result<Vec<Model>>;

    /// Cheapest round trip the protocol offers; returns elapsed wall-clock time
    async fn ping(&self) -> Result<Duration>;

    /// Server version string
    async fn version(&self) -> Result<String>;

    async fn has_model(&self, name: &str) -> Result<bool> {
        Ok(self.list_models().await?.iter().any(|m| m.name == name))
    }
}

/// Headers attached to every request: JSON content type plus an optional bearer token
pub(crate) fn request_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    headers
}

/// Join a base URL and an absolute path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into a protocol error carrying the status and body
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Protocol {
        status: status.as_u16(),
        body,
    })
}

/// Split a streamed body into non-empty, trimmed lines
///
/// Lines may span several network chunks; a trailing line without a newline
/// is still emitted. A read error ends the stream after being yielded.
pub(crate) fn body_lines(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let bytes = response.bytes_stream().boxed();

    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (bytes, buffer, finished)));
                }

                if finished {
                    let line = String::from_utf8_lossy(&buffer).trim().to_string();
                    buffer.clear();
                    if line.is_empty() {
                        return None;
                    }
                    return Some((Ok(line), (bytes, buffer, finished)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buffer.clear();
                        return Some((Err(AppError::from(e)), (bytes, buffer, true)));
                    }
                    None => finished = true,
                }
            }
        },
    )
}

/// Create the client matching the host's configured protocol
pub fn create_backend_client(host: &Host, timeout: Duration) -> Result<Arc<dyn BackendClient>> {
    match host.backend {
        BackendType::Ollama => Ok(Arc::new(OllamaClient::new(host, timeout)?)),
        BackendType::OpenAI => Ok(Arc::new(OpenAICompatibleClient::new(host, timeout)?)),
    }
}
