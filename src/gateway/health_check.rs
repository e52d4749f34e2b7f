//! Host probing: liveness, latency, version and model discovery
//!
//! Every probe produces a fresh [`HostStatus`] which overwrites the cached
//! snapshot for that host. Probe failures never escape this module as errors;
//! they are recorded on the snapshot and the host is reported offline.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{HostRegistry, Model};
use crate::config::Host;
use crate::error::AppError;

/// Snapshot produced by one probe of one host
#[derive(Debug, Clone)]
pub struct HostStatus {
    pub host: Arc<Host>,
    pub online: bool,
    /// Ping round trip; zero when offline
    pub latency: Duration,
    pub version: Option<String>,
    /// Empty when offline or when the catalog could not be fetched
    pub models: Vec<Model>,
    /// Why the probe failed; `None` when online or when the host has no client
    pub error: Option<AppError>,
    pub checked_at: DateTime<Utc>,
}

impl HostStatus {
    fn offline(host: Arc<Host>, error: Option<AppError>) -> Self {
        Self {
            host,
            online: false,
            latency: Duration::ZERO,
            version: None,
            models: Vec::new(),
            error,
            checked_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.host.name
    }

    /// Exact-name lookup in this host's last-known model list
    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m.name == model)
    }
}

/// Result emitted by the streaming check, tagged with the host's registration index
#[derive(Debug, Clone)]
pub struct HostCheckResult {
    pub index: usize,
    pub status: HostStatus,
}

/// Probes registered hosts and caches the latest snapshot per host
///
/// Cloning is cheap; clones share the registry and the cache.
#[derive(Clone)]
pub struct HostManager {
    registry: Arc<HostRegistry>,
    cache: Arc<RwLock<HashMap<String, HostStatus>>>,
}

impl HostManager {
    /// Create a manager over a registry
    pub fn new(registry: Arc<HostRegistry>) -> Self {
        Self {
            registry,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Probe one host and cache the result
    pub async fn check_host(&self, host: Arc<Host>) -> HostStatus {
        let status = self.probe(host).await;
        self.cache
            .write()
            .insert(status.host.name.clone(), status.clone());
        status
    }

    async fn probe(&self, host: Arc<Host>) -> HostStatus {
        let Some(client) = self.registry.get_client(&host.name) else {
            warn!(host = %host.name, "No client bound to host");
            return HostStatus::offline(host, None);
        };

        let latency = match client.ping().await {
            Ok(latency) => latency,
            Err(e) => {
                debug!(host = %host.name, error = %e, "Host unreachable");
                return HostStatus::offline(host, Some(e));
            }
        };

        let version = match client.version().await {
            Ok(version) => Some(version),
            Err(e) => {
                debug!(host = %host.name, error = %e, "Version lookup failed");
                None
            }
        };

        let models = match client.list_models().await {
            Ok(models) => models,
            Err(e) => {
                debug!(host = %host.name, error = %e, "Model listing failed");
                Vec::new()
            }
        };

        debug!(
            host = %host.name,
            latency_ms = latency.as_secs_f64() * 1000.0,
            models = models.len(),
            "Host online"
        );

        HostStatus {
            host,
            online: true,
            latency,
            version,
            models,
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Probe every host concurrently and wait for all of them
    ///
    /// Results are in registration order regardless of completion order.
    pub async fn check_all_hosts(&self) -> Vec<HostStatus> {
        let hosts = self.registry.list_hosts();

        let handles: Vec<(Arc<Host>, JoinHandle<HostStatus>)> = hosts
            .into_iter()
            .map(|host| {
                let manager = self.clone();
                let task_host = host.clone();
                (host, tokio::spawn(async move { manager.check_host(task_host).await }))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let status = match handle.await {
                Ok(status) => status,
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Probe task failed");
                    HostStatus::offline(host, Some(AppError::Internal(e.to_string())))
                }
            };
            results.push(status);
        }

        let online = results.iter().filter(|s| s.online).count();
        info!(total = results.len(), online, "Checked all hosts");

        results
    }

    /// Probe every host concurrently, emitting each result as soon as it completes
    ///
    /// Returns the receiver and the number of results that will arrive. The
    /// channel closes once every probe has finished. Arrival order is completion
    /// order; use [`HostCheckResult::index`] to recover registration order.
    pub fn check_all_hosts_streaming(&self) -> (mpsc::Receiver<HostCheckResult>, usize) {
        let hosts = self.registry.list_hosts();
        let expected = hosts.len();
        let (tx, rx) = mpsc::channel(expected.max(1));

        for (index, host) in hosts.into_iter().enumerate() {
            let manager = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let status = manager.check_host(host).await;
                // The receiver may have been dropped; the cache is already updated.
                let _ = tx.send(HostCheckResult { index, status }).await;
            });
        }

        (rx, expected)
    }

    /// Last cached snapshot for a host, without probing; may be stale
    pub fn get_cached_status(&self, name: &str) -> Option<HostStatus> {
        self.cache.read().get(name).cloned()
    }

    /// All cached snapshots in registration order, skipping hosts never probed
    pub fn cached_statuses(&self) -> Vec<HostStatus> {
        let hosts = self.registry.list_hosts();
        let cache = self.cache.read();
        hosts
            .iter()
            .filter_map(|h| cache.get(&h.name).cloned())
            .collect()
    }

    /// Re-probe all hosts on a fixed interval until the handle is aborted
    pub fn spawn_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.check_all_hosts().await;
            }
        })
    }
}
