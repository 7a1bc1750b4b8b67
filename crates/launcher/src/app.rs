use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::config::OrchestratorArgs;
use crate::config::ServeArgs;
use crate::k8s::KubeCluster;
use crate::orchestrator::LaunchCoordinator;
use crate::orchestrator::MappingStore;
use crate::session::SessionStore;

/// Build a coordinator talking to the configured cluster.
pub async fn build_coordinator(args: &OrchestratorArgs) -> Result<LaunchCoordinator> {
    let settings = args.launch_settings();
    let cluster = KubeCluster::connect(args.kubeconfig.clone(), settings.namespace.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to cluster: {e:?}"))?;

    let coordinator = LaunchCoordinator::new(
        Arc::new(cluster),
        MappingStore::new(&args.mapping_file),
        settings,
    );
    tracing::info!(
        namespace = %args.namespace,
        gpu_resource = %args.gpu_resource,
        mapping_file = %coordinator.mappings().path().display(),
        "Connected to cluster"
    );

    Ok(coordinator)
}

/// The long-running launch service
pub struct Application {
    coordinator: Arc<LaunchCoordinator>,
    sessions: Arc<SessionStore>,
    listen_addr: String,
    cancellation_token: CancellationToken,
}

impl Application {
    pub fn new(coordinator: LaunchCoordinator, listen_addr: String) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            sessions: Arc::new(SessionStore::new()),
            listen_addr,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub async fn build(args: &ServeArgs) -> Result<Self> {
        let coordinator = build_coordinator(&args.orchestrator).await?;
        Ok(Self::new(coordinator, args.listen_addr.clone()))
    }

    /// Serve the API until a shutdown signal arrives or the server exits.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting launch service...");

        let mut api_task = self.spawn_api_server_task();

        let signalled = tokio::select! {
            result = wait_for_signal() => {
                result?;
                true
            }
            result = &mut api_task => {
                if let Err(e) = result {
                    tracing::error!("API server task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("API server task completed unexpectedly");
                false
            }
        };

        if signalled {
            tracing::info!("Shutdown signal received, stopping API server");
            self.cancellation_token.cancel();
            match tokio::time::timeout(Duration::from_secs(30), api_task).await {
                Ok(Err(e)) => tracing::error!("API server task failed during shutdown: {e}"),
                Err(_) => tracing::warn!("API server shutdown timed out"),
                Ok(Ok(())) => {}
            }
        }

        tracing::info!("Launch service stopped");
        Ok(())
    }

    fn spawn_api_server_task(&self) -> JoinHandle<()> {
        let server = ApiServer::new(
            self.coordinator.clone(),
            self.sessions.clone(),
            self.listen_addr.clone(),
        );
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting API server task");
            if let Err(e) = server.run(token).await {
                tracing::error!("API server failed: {e:?}");
            } else {
                tracing::info!("API server task completed");
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    Ok(())
}
