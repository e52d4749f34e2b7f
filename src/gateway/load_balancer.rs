//! Host selection policy
//!
//! Online, enabled hosts are ranked by priority (lower first) and then by
//! measured latency. Every query re-probes the fleet; nothing here reads the
//! cache.

use std::cmp::Ordering;

use crate::gateway::health_check::{HostManager, HostStatus};

/// Ranking comparator: priority ascending, then latency ascending
pub fn compare_hosts(a: &HostStatus, b: &HostStatus) -> Ordering {
    a.host
        .priority
        .cmp(&b.host.priority)
        .then_with(|| a.latency.cmp(&b.latency))
}

/// Keep online, enabled hosts and sort them by [`compare_hosts`]
pub fn rank_online(statuses: Vec<HostStatus>) -> Vec<HostStatus> {
    let mut online: Vec<HostStatus> = statuses
        .into_iter()
        .filter(|s| s.online && s.host.enabled)
        .collect();
    // stable: equal priority and latency keep registration order
    online.sort_by(compare_hosts);
    online
}

/// Hosts from an already ranked list whose model list contains `model` exactly
pub fn serving_model(ranked: Vec<HostStatus>, model: &str) -> Vec<HostStatus> {
    ranked.into_iter().filter(|s| s.has_model(model)).collect()
}

impl HostManager {
    /// Check all hosts and return the online, enabled ones in ranked order
    pub async fn get_online_hosts(&self) -> Vec<HostStatus> {
        rank_online(self.check_all_hosts().await)
    }

    /// Highest-ranked online host; `None` means no route is available
    pub async fn get_best_host(&self) -> Option<HostStatus> {
        self.get_online_hosts().await.into_iter().next()
    }

    /// Highest-ranked online host that serves `model`
    pub async fn get_host_with_model(&self, model: &str) -> Option<HostStatus> {
        self.find_model(model).await.into_iter().next()
    }

    /// Every online host that serves `model`, in ranked order
    pub async fn find_model(&self, model: &str) -> Vec<HostStatus> {
        serving_model(self.get_online_hosts().await, model)
    }
}
