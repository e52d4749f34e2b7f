//! LLM Host Router
//!
//! Keeps a registry of local and remote LLM inference hosts (Ollama-native and
//! OpenAI-compatible), probes them concurrently, and routes requests to the best
//! online host serving the requested model.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{AppError, Result};

use std::sync::Arc;

use crate::backend::HostRegistry;
use crate::config::Settings;
use crate::gateway::{HostManager, Router, RouterConfig};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<HostRegistry>,
    pub manager: HostManager,
    pub router: Router,
}

impl AppState {
    /// Wire a registry, manager and router together
    pub fn new(settings: Settings, registry: Arc<HostRegistry>) -> Self {
        let manager = HostManager::new(registry.clone());
        let router = Router::with_config(
            manager.clone(),
            RouterConfig {
                fallback_enabled: settings.routing.fallback,
            },
        );

        Self {
            settings: Arc::new(settings),
            registry,
            manager,
            router,
        }
    }
}
