//! Application settings and host fleet configuration

use crate::error::{AppError, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub routing: RoutingConfig,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    11500
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Routing and probing behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Fixed per-request timeout applied to every backend client
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,

    /// Try the next host serving a model when generation fails
    #[serde(default = "default_true")]
    pub fallback: bool,

    /// Background re-probe interval; 0 disables the loop
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    120_000
}

fn default_refresh_interval() -> u64 {
    30
}

impl RoutingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Wire protocol spoken by a host
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Ollama native API
    #[default]
    #[serde(alias = "native")]
    Ollama,
    /// OpenAI-compatible API (llama.cpp, vLLM, LM Studio, ...)
    #[serde(rename = "openai", alias = "openai-compatible")]
    OpenAI,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Ollama => write!(f, "ollama"),
            BackendType::OpenAI => write!(f, "openai"),
        }
    }
}

/// A configured LLM endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Host {
    /// Unique key within a registry
    pub name: String,

    pub url: String,

    /// Lower is preferred
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: BackendType,

    /// Models served by hosts that cannot report their own catalog
    #[serde(default, rename = "models", skip_serializing_if = "Vec::is_empty")]
    pub static_models: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key, consulted when `api_key` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_priority() -> i32 {
    10
}

impl Host {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            priority: default_priority(),
            enabled: true,
            backend: BackendType::default(),
            static_models: Vec::new(),
            api_key: None,
            api_key_env: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The bearer credential for this host, if any
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.api_key_env.as_ref().and_then(|var| std::env::var(var).ok()))
            .filter(|key| !key.is_empty())
    }
}

/// Fleet used when no hosts are configured
pub fn default_hosts() -> Vec<Host> {
    vec![Host::new("local-gpu", "http://localhost:11434").with_priority(1)]
}

impl Settings {
    /// Load settings from the default configuration file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/router.yaml")
    }

    /// Load settings from a YAML or TOML file; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let format = if path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml")
        {
            FileFormat::Yaml
        } else {
            FileFormat::Toml
        };

        let mut config_builder = Config::builder()
            .set_default("server.host", default_listen_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .set_default("routing.request_timeout_ms", default_timeout() as i64)?
            .set_default("routing.fallback", true)?
            .set_default(
                "routing.refresh_interval_secs",
                default_refresh_interval() as i64,
            )?;

        if path.exists() {
            config_builder = config_builder.add_source(File::from(path).format(format));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("LLM_ROUTER")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = config_builder.build()?.try_deserialize()?;

        if settings.hosts.is_empty() {
            settings.hosts = default_hosts();
        }

        Ok(settings)
    }

    /// Parse a YAML host list (the `hosts:` section on its own)
    pub fn hosts_from_yaml(content: &str) -> Result<Vec<Host>> {
        serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse host list: {}", e)))
    }

    /// Serialize the effective host list as YAML
    pub fn hosts_to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.hosts)
            .map_err(|e| AppError::Config(format!("Failed to serialize host list: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.is_empty() {
                return Err(AppError::Config("Host name cannot be empty".to_string()));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Host '{}' is defined more than once",
                    host.name
                )));
            }
            reqwest::Url::parse(&host.url).map_err(|e| {
                AppError::Config(format!("Host '{}' has invalid url '{}': {}", host.name, host.url, e))
            })?;
        }

        Ok(())
    }

    /// Enabled hosts in configuration order
    pub fn enabled_hosts(&self) -> Vec<&Host> {
        self.hosts.iter().filter(|h| h.enabled).collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_listen_host(),
                port: default_port(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            routing: RoutingConfig {
                request_timeout_ms: default_timeout(),
                fallback: true,
                refresh_interval_secs: default_refresh_interval(),
            },
            hosts: default_hosts(),
        }
    }
}
