//! HTTP request handlers

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::api::models::*;
use crate::backend::GenerateRequest;
use crate::error::{AppError, Result};
use crate::AppState;

/// Process liveness; does not probe any host
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hosts_registered: state.registry.len(),
    })
}

/// Check every host and wait for all results
pub async fn list_hosts(State(state): State<Arc<AppState>>) -> Json<HostListResponse> {
    let statuses = state.manager.check_all_hosts().await;
    Json(HostListResponse::from_statuses(&statuses))
}

/// Check every host, sending one `host` event per completed probe
pub async fn stream_hosts(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (rx, expected) = state.manager.check_all_hosts_streaming();
    info!(expected, "Streaming host checks");

    let events = stream::unfold(rx, move |mut rx| async move {
        let result = rx.recv().await?;
        let payload = HostCheckEvent {
            index: result.index,
            expected,
            status: HostStatusInfo::from(&result.status),
        };
        Some((Event::default().event("host").json_data(payload), rx))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Ranked online hosts
pub async fn online_hosts(State(state): State<Arc<AppState>>) -> Json<HostListResponse> {
    let online = state.manager.get_online_hosts().await;
    Json(HostListResponse::from_statuses(&online))
}

/// Best host, or null when nothing is online
pub async fn best_host(State(state): State<Arc<AppState>>) -> Json<BestHostResponse> {
    let best = state.manager.get_best_host().await;
    Json(BestHostResponse {
        host: best.as_ref().map(HostStatusInfo::from),
    })
}

/// Cached snapshot for one host; never probes
pub async fn cached_host(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<HostStatusInfo>> {
    if !state.registry.contains(&name) {
        return Err(AppError::Configuration(name));
    }

    state
        .manager
        .get_cached_status(&name)
        .map(|status| Json(HostStatusInfo::from(&status)))
        .ok_or_else(|| AppError::NotFound(format!("host '{}' has not been checked yet", name)))
}

/// Model name to hosts index
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelIndexResponse> {
    Json(ModelIndexResponse {
        models: state.manager.get_all_models().await,
    })
}

/// Online hosts serving a model, ranked
pub async fn model_hosts(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Json<ModelHostsResponse> {
    let hosts = state.manager.find_model(&model).await;
    Json(ModelHostsResponse {
        hosts: hosts.iter().map(HostStatusInfo::from).collect(),
        model,
    })
}

/// Route a generation request
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApiGenerateRequest>,
) -> Result<Json<ApiGenerateResponse>> {
    if request.model.is_empty() {
        return Err(AppError::InvalidRequest("model is required".to_string()));
    }

    info!(
        model = %request.model,
        prompt_len = request.prompt.len(),
        pinned = request.host.is_some(),
        "Received generate request"
    );

    let pinned = request.host.clone();
    let request = GenerateRequest::from(request);
    let routed = match pinned {
        Some(host) => state.router.generate_on(&host, request).await?,
        None => state.router.generate(request).await?,
    };

    Ok(Json(ApiGenerateResponse::from(routed)))
}

/// Route a generation request and relay chunks as `chunk` events
///
/// A read error mid-stream is sent as a final `error` event.
pub async fn generate_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApiGenerateRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    if request.model.is_empty() {
        return Err(AppError::InvalidRequest("model is required".to_string()));
    }

    info!(
        model = %request.model,
        pinned = request.host.is_some(),
        "Received streaming generate request"
    );

    let pinned = request.host.clone();
    let request = GenerateRequest::from(request);
    let routed = match pinned {
        Some(host) => state.router.generate_stream_on(&host, request).await?,
        None => state.router.generate_stream(request).await?,
    };

    let host = routed.host.name.clone();
    let events = routed.stream.map(move |chunk| match chunk {
        Ok(chunk) => Event::default()
            .event("chunk")
            .json_data(GenerateChunkEvent::new(&host, chunk)),
        Err(e) => Event::default().event("error").json_data(json!({
            "message": e.to_string(),
            "type": e.kind(),
        })),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
