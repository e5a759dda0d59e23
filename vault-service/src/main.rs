use service_core::observability::init_tracing;
use vault_service::config::VaultConfig;
use vault_service::services::metrics::init_metrics;
use vault_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = VaultConfig::load().map_err(|e| {
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    // Must be installed before the first counter is touched.
    init_metrics();

    tracing::info!(
        environment = %config.common.environment,
        port = config.common.port,
        "Starting {}",
        config.service_name
    );

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await?;
    tracing::info!("Server shut down");
    Ok(())
}
