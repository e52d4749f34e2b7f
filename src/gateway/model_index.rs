//! Model name to serving hosts index

use std::collections::BTreeMap;

use crate::gateway::health_check::{HostManager, HostStatus};

/// Model name mapped to the names of the hosts serving it
pub type ModelIndex = BTreeMap<String, Vec<String>>;

/// Build the index from a set of snapshots; offline hosts contribute nothing
///
/// Host names within a bucket follow the order of `statuses`. A host listing the same
/// model twice appears once in that bucket.
pub fn build_model_index(statuses: &[HostStatus]) -> ModelIndex {
    let mut index = ModelIndex::new();

    for status in statuses.iter().filter(|s| s.online) {
        for model in &status.models {
            let bucket = index.entry(model.name.clone()).or_default();
            if !bucket.iter().any(|h| h == status.name()) {
                bucket.push(status.name().to_string());
            }
        }
    }

    index
}

impl HostManager {
    /// Check all hosts and index their models
    pub async fn get_all_models(&self) -> ModelIndex {
        build_model_index(&self.check_all_hosts().await)
    }
}
