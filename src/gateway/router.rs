//! Model-aware request routing with fallback across hosts

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backend::{GenerateRequest, GenerateResponse, GenerateStream};
use crate::config::Host;
use crate::error::{AppError, Result};
use crate::gateway::health_check::{HostManager, HostStatus};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Try the next host serving the model when one fails
    pub fallback_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
        }
    }
}

/// A generation result together with the host that produced it
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub host: Arc<Host>,
    /// Hosts tried, including the one that succeeded
    pub attempts: usize,
    pub response: GenerateResponse,
}

/// A streamed generation together with the host producing it
pub struct RoutedStream {
    pub host: Arc<Host>,
    /// Hosts tried, including the one streaming
    pub attempts: usize,
    pub stream: GenerateStream,
}

/// Routes generation requests to hosts serving the requested model
#[derive(Clone)]
pub struct Router {
    manager: HostManager,
    config: RouterConfig,
}

impl Router {
    pub fn new(manager: HostManager) -> Self {
        Self::with_config(manager, RouterConfig::default())
    }

    pub fn with_config(manager: HostManager, config: RouterConfig) -> Self {
        Self { manager, config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Best online host serving `model`
    pub async fn route(&self, model: &str) -> Result<HostStatus> {
        self.manager
            .get_host_with_model(model)
            .await
            .ok_or_else(|| AppError::NoRoute(model.to_string()))
    }

    /// Generate on the best host serving the model, falling back down the ranking
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn generate(&self, request: GenerateRequest) -> Result<RoutedResponse> {
        let mut candidates = self.manager.find_model(&request.model).await;
        if candidates.is_empty() {
            return Err(AppError::NoRoute(request.model.clone()));
        }
        if !self.config.fallback_enabled {
            candidates.truncate(1);
        }

        let mut last_error = None;
        for (attempt, candidate) in candidates.into_iter().enumerate() {
            let host = candidate.host;
            let Some(client) = self.manager.registry().get_client(&host.name) else {
                last_error = Some(AppError::Configuration(host.name.clone()));
                continue;
            };

            match client.generate(request.clone()).await {
                Ok(response) => {
                    info!(
                        host = %host.name,
                        attempts = attempt + 1,
                        completion_tokens = response.completion_tokens,
                        "Generation completed"
                    );
                    return Ok(RoutedResponse {
                        host,
                        attempts: attempt + 1,
                        response,
                    });
                }
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Generation failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::NoRoute(request.model.clone())))
    }

    /// Stream from the best host serving the model
    ///
    /// Fallback only covers failures before the first chunk; once a host has
    /// started streaming, read errors are delivered on the stream.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn generate_stream(&self, request: GenerateRequest) -> Result<RoutedStream> {
        let mut candidates = self.manager.find_model(&request.model).await;
        if candidates.is_empty() {
            return Err(AppError::NoRoute(request.model.clone()));
        }
        if !self.config.fallback_enabled {
            candidates.truncate(1);
        }

        let mut last_error = None;
        for (attempt, candidate) in candidates.into_iter().enumerate() {
            let host = candidate.host;
            let Some(client) = self.manager.registry().get_client(&host.name) else {
                last_error = Some(AppError::Configuration(host.name.clone()));
                continue;
            };

            match client.generate_stream(request.clone()).await {
                Ok(stream) => {
                    info!(host = %host.name, attempts = attempt + 1, "Streaming generation started");
                    return Ok(RoutedStream {
                        host,
                        attempts: attempt + 1,
                        stream,
                    });
                }
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Streaming generation failed to start");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::NoRoute(request.model.clone())))
    }

    /// Stream from a named host, bypassing selection
    pub async fn generate_stream_on(
        &self,
        name: &str,
        request: GenerateRequest,
    ) -> Result<RoutedStream> {
        let registry = self.manager.registry();
        let (Some(host), Some(client)) = (registry.get_host(name), registry.get_client(name)) else {
            return Err(AppError::Configuration(name.to_string()));
        };

        let stream = client.generate_stream(request).await?;
        Ok(RoutedStream {
            host,
            attempts: 1,
            stream,
        })
    }

    /// Generate on a named host, bypassing selection
    pub async fn generate_on(&self, name: &str, request: GenerateRequest) -> Result<RoutedResponse> {
        let registry = self.manager.registry();
        let (Some(host), Some(client)) = (registry.get_host(name), registry.get_client(name)) else {
            return Err(AppError::Configuration(name.to_string()));
        };

        let response = client.generate(request).await?;
        Ok(RoutedResponse {
            host,
            attempts: 1,
            response,
        })
    }
}
