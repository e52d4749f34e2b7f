//! Main entry point for the LLM host router

use llm_host_router::{
    api,
    backend::HostRegistry,
    config::{LoggingConfig, Settings},
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    init_tracing(&settings.logging);
    info!("Starting LLM host router");

    // Register hosts
    let registry = Arc::new(HostRegistry::with_timeout(
        settings.routing.request_timeout(),
    ));
    registry.initialize_from_config(&settings.hosts)?;
    info!(
        hosts = registry.len(),
        enabled = settings.enabled_hosts().len(),
        "Registered hosts"
    );

    let refresh_interval = settings.routing.refresh_interval();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::new(settings, registry));

    // Initial discovery, reported as hosts answer
    {
        let (mut results, expected) = app_state.manager.check_all_hosts_streaming();
        tokio::spawn(async move {
            let mut online = 0;
            while let Some(result) = results.recv().await {
                let status = result.status;
                if status.online {
                    online += 1;
                    info!(
                        host = %status.host.name,
                        latency_ms = status.latency.as_secs_f64() * 1000.0,
                        models = status.models.len(),
                        "Host online"
                    );
                } else {
                    warn!(
                        host = %status.host.name,
                        error = %status.error.as_ref().map(ToString::to_string).unwrap_or_default(),
                        "Host offline"
                    );
                }
            }
            info!(expected, online, "Initial discovery finished");
        });
    }

    let _refresh = refresh_interval.map(|interval| app_state.manager.spawn_refresh(interval));

    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
