use dotenvy::dotenv;
use newsletter_frontend::config::get_configuration;
use newsletter_frontend::services::{BackendClient, ContextRegistry, GoTrueClient};
use newsletter_frontend::startup::build_router;
use newsletter_frontend::views::EditorFields;
use newsletter_frontend::AppState;
use service_core::observability::{init_tracing, install_metrics_recorder};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How often idle client contexts are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    // Initialize tracing using shared logic
    let telemetry = &configuration.telemetry;
    init_tracing(
        &telemetry.service_name,
        &telemetry.log_level,
        telemetry.otlp_endpoint.as_deref(),
    )?;

    let metrics = install_metrics_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    let identity = Arc::new(GoTrueClient::new(configuration.identity.clone()));
    let backend = Arc::new(BackendClient::new(&configuration.backend));
    info!(
        backend = %backend.base_url(),
        identity = %configuration.identity.url,
        "Configured upstream services"
    );

    let registry = Arc::new(ContextRegistry::new(
        identity,
        backend,
        chrono::Duration::seconds(configuration.identity.refresh_margin_secs),
    ));
    let max_idle = Duration::from_secs(
        u64::try_from(configuration.server.session_inactivity_hours).unwrap_or(24) * 3600,
    );
    Arc::clone(&registry).spawn_sweeper(SWEEP_INTERVAL, max_idle);

    let state = AppState::new(
        registry,
        EditorFields::new(&configuration.editor),
        Duration::from_millis(configuration.server.gate_wait_ms),
        metrics,
    );
    let app = build_router(state, configuration.server.session_inactivity_hours);

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting newsletter-frontend on {}", address);
    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
