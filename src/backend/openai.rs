//! OpenAI API compatible backend (llama.cpp server, vLLM, LM Studio, hosted APIs)

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, trace, warn};

use super::{
    body_lines, ensure_success, join_url, request_headers, BackendClient, GenerateChunk,
    GenerateRequest, GenerateResponse, GenerateStream, Model, ServerTimings,
};
use crate::config::{BackendType, Host};
use crate::error::{AppError, Result};

const MODELS_PATH: &str = "/v1/models";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

impl From<&GenerateRequest> for ChatCompletionRequest {
    fn from(request: &GenerateRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));

        Self {
            model: request.model.clone(),
            messages,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            stream: false,
        }
    }
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Chat choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One `data:` event of a streamed chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    #[serde(default)]
    pub delta: ChatDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<ChatCompletionChunk> for GenerateChunk {
    fn from(event: ChatCompletionChunk) -> Self {
        let choice = event.choices.into_iter().next();
        GenerateChunk {
            done: choice.as_ref().map_or(false, |c| c.finish_reason.is_some()),
            text: choice.and_then(|c| c.delta.content).unwrap_or_default(),
            model: (!event.model.is_empty()).then_some(event.model),
            prompt_tokens: event.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: event.usage.as_ref().map(|u| u.completion_tokens),
            timings: ServerTimings::default(),
        }
    }
}

/// Payload of an SSE line; `None` for comments, other fields and the `[DONE]` sentinel
fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim();
    (data != "[DONE]").then_some(data)
}

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl From<ModelInfo> for Model {
    fn from(info: ModelInfo) -> Self {
        Model {
            name: info.id,
            modified_at: info
                .created
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            size: None,
        }
    }
}

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// Client for hosts speaking the OpenAI chat completions API
pub struct OpenAICompatibleClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    static_models: Vec<String>,
    client: Client,
}

impl OpenAICompatibleClient {
    /// Create a new OpenAI compatible client
    pub fn new(host: &Host, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: host.name.clone(),
            base_url: host.url.trim_end_matches('/').to_string(),
            api_key: host.resolve_api_key(),
            static_models: host.static_models.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn configured_models(&self) -> Vec<Model> {
        self.static_models.iter().map(Model::named).collect()
    }

    async fn post_chat(&self, body: ChatCompletionRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(CHAT_COMPLETIONS_PATH))
            .headers(request_headers(self.api_key.as_deref()))
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }

    async fn get_models(&self) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.url(MODELS_PATH))
            .headers(request_headers(self.api_key.as_deref()))
            .send()
            .await?)
    }
}

/// Status codes meaning "this server has no model catalog endpoint"
fn catalog_unsupported(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    )
}

#[async_trait]
impl BackendClient for OpenAICompatibleClient {
    fn backend_type(&self) -> BackendType {
        BackendType::OpenAI
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, request), fields(host = %self.name, model = %request.model))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        debug!("Sending chat completion request");

        let start = Instant::now();
        let response = self.post_chat(ChatCompletionRequest::from(&request)).await?;

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse chat completion response");
            AppError::Decode(e.to_string())
        })?;
        let duration = start.elapsed();

        let usage = result.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });
        let choice = result.choices.into_iter().next();

        Ok(GenerateResponse {
            model: if result.model.is_empty() {
                request.model
            } else {
                result.model
            },
            done: choice.is_some(),
            text: choice.map(|c| c.message.content).unwrap_or_default(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            duration,
            timings: ServerTimings::default(),
        })
    }

    #[instrument(skip(self, request), fields(host = %self.name, model = %request.model))]
    async fn generate_stream(&self, request: GenerateRequest) -> Result<GenerateStream> {
        debug!("Starting streaming chat completion request");

        let mut body = ChatCompletionRequest::from(&request);
        body.stream = true;
        let response = self.post_chat(body).await?;

        let chunks = body_lines(response).filter_map(|line| async move {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            let data = sse_data(&line)?;
            match serde_json::from_str::<ChatCompletionChunk>(data) {
                Ok(event) => Some(Ok(GenerateChunk::from(event))),
                Err(e) => {
                    trace!(error = %e, "Skipping malformed stream event");
                    None
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let response = self.get_models().await?;

        if catalog_unsupported(response.status()) {
            debug!(
                host = %self.name,
                status = %response.status(),
                "Model catalog unsupported, using configured models"
            );
            return Ok(self.configured_models());
        }

        let catalog: ModelsResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                warn!(host = %self.name, error = %e, "Failed to parse models response");
                AppError::Decode(e.to_string())
            })?;

        if catalog.data.is_empty() {
            return Ok(self.configured_models());
        }

        Ok(catalog.data.into_iter().map(Model::from).collect())
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        ensure_success(self.get_models().await?).await?;
        Ok(start.elapsed())
    }

    async fn version(&self) -> Result<String> {
        Err(AppError::Unsupported("version".to_string()))
    }
}
