use crate::config::{StorageBackend, VaultConfig};
use crate::models::{IngestContracts, Lease};
use crate::services::{
    AuditSink, InMemorySecretVault, InMemoryStore, JsonFileStore, JsonLinesAuditSink,
    KeyValueStore, TracingAuditSink,
};
use crate::{build_router, AppState};
use service_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: VaultConfig) -> Result<Self, AppError> {
        let (contracts, leases) = build_stores(&config).await?;
        let audit = build_audit_sink(&config).await?;

        tracing::info!(
            backend = ?config.storage.backend,
            issuance_enabled = config.phase.issuance_enabled,
            consumption_enabled = config.phase.consumption_enabled,
            authorized_issuers = ?config.lease.authorized_issuers,
            max_ttl_seconds = config.lease.max_ttl_seconds,
            "Vault pipeline configured"
        );

        // Secret material never leaves this process; only fingerprints do.
        let vault = Arc::new(InMemorySecretVault::new());
        let state = AppState::new(config.clone(), contracts, leases, vault, audit);
        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

type Stores = (
    Arc<dyn KeyValueStore<IngestContracts>>,
    Arc<dyn KeyValueStore<Lease>>,
);

async fn build_stores(config: &VaultConfig) -> Result<Stores, AppError> {
    match config.storage.backend {
        StorageBackend::Memory => Ok((
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
        )),
        StorageBackend::File => {
            let dir = Path::new(&config.storage.data_dir);
            let contracts = JsonFileStore::new(dir.join("contracts.json"))
                .await
                .map_err(|e| {
                    tracing::error!("Failed to open contract store in {}: {}", dir.display(), e);
                    AppError::InternalError(anyhow::Error::new(e))
                })?;
            let leases = JsonFileStore::new(dir.join("leases.json"))
                .await
                .map_err(|e| {
                    tracing::error!("Failed to open lease store in {}: {}", dir.display(), e);
                    AppError::InternalError(anyhow::Error::new(e))
                })?;
            Ok((Arc::new(contracts), Arc::new(leases)))
        }
    }
}

async fn build_audit_sink(config: &VaultConfig) -> Result<Arc<dyn AuditSink>, AppError> {
    match &config.audit.path {
        Some(path) => {
            let sink = JsonLinesAuditSink::new(path).await.map_err(|e| {
                tracing::error!("Failed to open audit log at {}: {}", path, e);
                AppError::ConfigError(e)
            })?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingAuditSink)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
