//! Ollama native API client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, trace};

use super::{
    body_lines, ensure_success, join_url, request_headers, BackendClient, GenerateChunk,
    GenerateRequest, GenerateResponse, GenerateStream, Model, ServerTimings,
};
use crate::config::{BackendType, Host};
use crate::error::{AppError, Result};

const VERSION_PATH: &str = "/api/version";
const TAGS_PATH: &str = "/api/tags";
const GENERATE_PATH: &str = "/api/generate";

/// `/api/generate` request body
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

/// `/api/generate` response; also the shape of each streamed line
///
/// Durations are nanoseconds and only present on the final object.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
}

impl OllamaGenerateResponse {
    fn timings(&self) -> ServerTimings {
        ServerTimings {
            total: self.total_duration.map(Duration::from_nanos),
            load: self.load_duration.map(Duration::from_nanos),
            prompt_eval: self.prompt_eval_duration.map(Duration::from_nanos),
            eval: self.eval_duration.map(Duration::from_nanos),
        }
    }
}

impl From<OllamaGenerateResponse> for GenerateChunk {
    fn from(line: OllamaGenerateResponse) -> Self {
        GenerateChunk {
            timings: line.timings(),
            model: (!line.model.is_empty()).then_some(line.model),
            text: line.response,
            done: line.done,
            prompt_tokens: line.prompt_eval_count,
            completion_tokens: line.eval_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

impl From<OllamaModel> for Model {
    fn from(model: OllamaModel) -> Self {
        Model {
            name: model.name,
            modified_at: model
                .modified_at
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            size: model.size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaVersionResponse {
    version: String,
}

/// Client for hosts speaking the Ollama native API
pub struct OllamaClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OllamaClient {
    /// Create a client with a fixed per-request timeout
    pub fn new(host: &Host, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: host.name.clone(),
            base_url: host.url.trim_end_matches('/').to_string(),
            api_key: host.resolve_api_key(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn post_generate(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let options = (!request.options.is_empty()).then(|| OllamaOptions {
            num_predict: request.options.max_tokens,
            temperature: request.options.temperature,
            num_ctx: request.options.num_ctx,
        });

        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options,
        };

        let response = self
            .client
            .post(self.url(GENERATE_PATH))
            .headers(request_headers(self.api_key.as_deref()))
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(self.url(path))
            .headers(request_headers(self.api_key.as_deref()))
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl BackendClient for OllamaClient {
    fn backend_type(&self) -> BackendType {
        BackendType::Ollama
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, request), fields(host = %self.name, model = %request.model))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        debug!("Sending generate request");

        let start = Instant::now();
        let response = self.post_generate(&request, false).await?;

        let result: OllamaGenerateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse generate response");
            AppError::Decode(e.to_string())
        })?;
        let duration = start.elapsed();

        Ok(GenerateResponse {
            timings: result.timings(),
            model: if result.model.is_empty() {
                request.model
            } else {
                result.model
            },
            text: result.response,
            prompt_tokens: result.prompt_eval_count.unwrap_or(0),
            completion_tokens: result.eval_count.unwrap_or(0),
            duration,
            done: result.done,
        })
    }

    #[instrument(skip(self, request), fields(host = %self.name, model = %request.model))]
    async fn generate_stream(&self, request: GenerateRequest) -> Result<GenerateStream> {
        debug!("Starting streaming generate request");

        let response = self.post_generate(&request, true).await?;

        let chunks = body_lines(response).filter_map(|line| async move {
            match line {
                Ok(line) => match serde_json::from_str::<OllamaGenerateResponse>(&line) {
                    Ok(parsed) => Some(Ok(GenerateChunk::from(parsed))),
                    Err(e) => {
                        trace!(error = %e, "Skipping malformed stream line");
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let tags: OllamaTagsResponse = self
            .get(TAGS_PATH)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Decode(e.to_string()))?;

        Ok(tags.models.into_iter().map(Model::from).collect())
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.get(VERSION_PATH).await?;
        Ok(start.elapsed())
    }

    async fn version(&self) -> Result<String> {
        let version: OllamaVersionResponse = self
            .get(VERSION_PATH)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Decode(e.to_string()))?;

        Ok(version.version)
    }
}
