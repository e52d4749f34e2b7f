//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{GenerateChunk, GenerateOptions, GenerateRequest};
use crate::config::BackendType;
use crate::gateway::{HostStatus, ModelIndex, RoutedResponse};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub hosts_registered: usize,
}

/// One host snapshot as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatusInfo {
    pub name: String,
    pub url: String,
    pub backend: BackendType,
    pub priority: i32,
    pub enabled: bool,
    pub online: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<&HostStatus> for HostStatusInfo {
    fn from(status: &HostStatus) -> Self {
        Self {
            name: status.host.name.clone(),
            url: status.host.url.clone(),
            backend: status.host.backend,
            priority: status.host.priority,
            enabled: status.host.enabled,
            online: status.online,
            latency_ms: millis(status.latency),
            version: status.version.clone(),
            models: status.models.iter().map(|m| m.name.clone()).collect(),
            error: status.error.as_ref().map(ToString::to_string),
            checked_at: status.checked_at,
        }
    }
}

/// Host list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostListResponse {
    pub hosts: Vec<HostStatusInfo>,
    pub total: usize,
    pub online: usize,
}

impl HostListResponse {
    pub fn from_statuses(statuses: &[HostStatus]) -> Self {
        Self {
            hosts: statuses.iter().map(HostStatusInfo::from).collect(),
            total: statuses.len(),
            online: statuses.iter().filter(|s| s.online).count(),
        }
    }
}

/// Best host response; `host` is null when nothing is online
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestHostResponse {
    pub host: Option<HostStatusInfo>,
}

/// Streaming check event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCheckEvent {
    pub index: usize,
    pub expected: usize,
    pub status: HostStatusInfo,
}

/// Model index response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelIndexResponse {
    pub models: ModelIndex,
}

/// Hosts serving one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHostsResponse {
    pub model: String,
    pub hosts: Vec<HostStatusInfo>,
}

/// Generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub num_ctx: Option<u32>,
    /// Pin the request to a named host instead of routing it
    #[serde(default)]
    pub host: Option<String>,
}

impl From<ApiGenerateRequest> for GenerateRequest {
    fn from(request: ApiGenerateRequest) -> Self {
        GenerateRequest {
            model: request.model,
            prompt: request.prompt,
            system: request.system,
            options: GenerateOptions {
                max_tokens: request.max_tokens,
                temperature: request.temperature,
                num_ctx: request.num_ctx,
            },
        }
    }
}

/// Generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGenerateResponse {
    pub host: String,
    pub model: String,
    pub response: String,
    pub done: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub duration_ms: f64,
    /// Server-reported generation time, when the backend reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_duration_ms: Option<f64>,
    pub tokens_per_second: f64,
    pub prompt_tokens_per_second: f64,
    pub attempts: usize,
}

fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl From<RoutedResponse> for ApiGenerateResponse {
    fn from(routed: RoutedResponse) -> Self {
        let response = routed.response;
        Self {
            host: routed.host.name.clone(),
            total_tokens: response.total_tokens(),
            tokens_per_second: response.tokens_per_second(),
            prompt_tokens_per_second: response.prompt_tokens_per_second(),
            duration_ms: millis(response.duration),
            eval_duration_ms: response.timings.eval.map(millis),
            load_duration_ms: response.timings.load.map(millis),
            model: response.model,
            response: response.text,
            done: response.done,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            attempts: routed.attempts,
        }
    }
}

/// Streamed generation event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateChunkEvent {
    pub host: String,
    pub text: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_duration_ms: Option<f64>,
}

impl GenerateChunkEvent {
    pub fn new(host: &str, chunk: GenerateChunk) -> Self {
        Self {
            host: host.to_string(),
            text: chunk.text,
            done: chunk.done,
            model: chunk.model,
            prompt_tokens: chunk.prompt_tokens,
            completion_tokens: chunk.completion_tokens,
            eval_duration_ms: chunk.timings.eval.map(millis),
        }
    }
}
