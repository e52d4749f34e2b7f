//! Configuration module

pub mod settings;

pub use settings::{
    default_hosts, BackendType, Host, LoggingConfig, RoutingConfig, ServerConfig, Settings,
};
