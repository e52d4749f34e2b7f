//! Host registry: configured endpoints and the client bound to each

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::backend::{create_backend_client, BackendClient};
use crate::config::Host;
use crate::error::Result;

/// Timeout applied to clients when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Default)]
struct RegistryInner {
    /// Registration order is preserved; it is the order of every check-all result
    hosts: Vec<Arc<Host>>,
    clients: HashMap<String, Arc<dyn BackendClient>>,
}

/// Registry of configured hosts
///
/// Hosts are immutable once added. Re-adding a name replaces that host and its
/// client in place, keeping its registration slot. No lock is held across I/O.
pub struct HostRegistry {
    inner: RwLock<RegistryInner>,
    request_timeout: Duration,
}

impl HostRegistry {
    /// Create an empty registry using the default client timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create an empty registry whose clients use the given per-request timeout
    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Register every configured host, disabled ones included
    pub fn initialize_from_config(&self, hosts: &[Host]) -> Result<()> {
        for host in hosts {
            self.add_host(host.clone())?;
            info!(
                name = %host.name,
                backend = %host.backend,
                url = %host.url,
                enabled = host.enabled,
                "Registered host"
            );
        }

        Ok(())
    }

    /// Build the client for a host and store both
    pub fn add_host(&self, host: Host) -> Result<()> {
        let client = create_backend_client(&host, self.request_timeout)?;
        self.register(host, client);
        Ok(())
    }

    /// Add several hosts in order
    pub fn add_hosts<I>(&self, hosts: I) -> Result<()>
    where
        I: IntoIterator<Item = Host>,
    {
        for host in hosts {
            self.add_host(host)?;
        }
        Ok(())
    }

    /// Store a host with a caller-supplied client
    pub fn register(&self, host: Host, client: Arc<dyn BackendClient>) {
        let host = Arc::new(host);
        let mut inner = self.inner.write();

        match inner.hosts.iter().position(|h| h.name == host.name) {
            Some(index) => {
                info!(name = %host.name, "Replacing host");
                inner.hosts[index] = host.clone();
            }
            None => inner.hosts.push(host.clone()),
        }
        inner.clients.insert(host.name.clone(), client);
    }

    /// Get a host by name
    pub fn get_host(&self, name: &str) -> Option<Arc<Host>> {
        self.inner
            .read()
            .hosts
            .iter()
            .find(|h| h.name == name)
            .cloned()
    }

    /// Get the client bound to a host
    pub fn get_client(&self, name: &str) -> Option<Arc<dyn BackendClient>> {
        self.inner.read().clients.get(name).cloned()
    }

    /// Snapshot of all hosts in registration order
    pub fn list_hosts(&self) -> Vec<Arc<Host>> {
        self.inner.read().hosts.clone()
    }

    /// Get the number of registered hosts
    pub fn len(&self) -> usize {
        self.inner.read().hosts.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().hosts.is_empty()
    }

    /// Check if a host exists
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().hosts.iter().any(|h| h.name == name)
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}
