use std::{
    net::SocketAddr,
    sync::{Arc, LazyLock},
};

use herald_common::{
    Signal,
    audit::{self, AuditConfig},
    internal, logging,
};
use herald_delivery::{Activities, ContentRenderer, DeliveryConfig, Orchestrator};
use herald_gateway::GatewayConfig;
use herald_metrics::MetricsConfig;
use herald_server::{ApiServer, AppState, HealthChecker, ServerConfig};
use herald_store::{MemoryContactDirectory, StorageConfig};
use herald_tracking::{IngestionService, StatsAggregator, SuppressionRegistry, WebhookConfig};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinHandle};

/// The whole service, as read from `herald.config.ron`
///
/// ```ron
/// Herald (
///     server: (listen_address: "[::]:8080"),
///     gateway: (provider: Mock),
///     delivery: (max_concurrent_sends: 16),
///     webhooks: (providers: { "resend": (secret: Env("RESEND_WEBHOOK_SECRET")) }),
///     storage: File(path: "/var/lib/herald"),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => internal!(level = DEBUG, "Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => internal!(level = DEBUG, "Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// A started service.
pub struct Running {
    pub address: SocketAddr,
    pub state: AppState,
    services: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    /// Wait for the HTTP server and the orchestrator to stop.
    ///
    /// # Errors
    ///
    /// The first error either of them stopped with.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.services.await?
    }
}

impl Herald {
    /// Open storage and wire every component together, without serving.
    ///
    /// Campaign statistics are rebuilt from the stored event log.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unresolvable secret, or storage that cannot
    /// be opened.
    pub async fn assemble(&self) -> anyhow::Result<AppState> {
        self.delivery.validate()?;

        let stores = self.storage.open().await?;
        let gateway = self.gateway.build()?;
        let verifiers = self.webhooks.verifiers()?;
        let tokens = self.delivery.token_signer()?;

        // Contact records live with the CRM; this directory only tracks
        // status changes made here.
        let suppressions =
            SuppressionRegistry::new(stores.suppressions.clone(), Arc::new(MemoryContactDirectory::new()));

        let stats = Arc::new(StatsAggregator::new());
        let events = stores.events.list().await?;
        let replayed = stats.replay(&events);
        internal!(
            level = INFO,
            events = events.len(),
            replayed,
            campaigns = stats.campaigns().len(),
            "Campaign statistics rebuilt"
        );

        let activities = Activities {
            gateway,
            suppressions: suppressions.clone(),
            workflows: stores.workflows.clone(),
            deliveries: stores.deliveries.clone(),
            events: stores.events.clone(),
            stats: stats.clone(),
            tokens,
            content: ContentRenderer::new(),
        };

        let ingestion = IngestionService::new(
            stores.events,
            stores.deliveries,
            stores.workflows,
            suppressions.clone(),
            stats.clone(),
        )
        .with_verifiers(verifiers);

        let health = Arc::new(HealthChecker::new(self.server.max_in_flight));
        health.set_storage_ready(true);
        health.set_webhooks_ready(true);

        Ok(AppState {
            orchestrator: Orchestrator::new(activities, &self.delivery),
            ingestion,
            suppressions,
            stats,
            health,
        })
    }

    /// Bind the HTTP server and start serving. Unfinished workflows resume.
    ///
    /// Both services stop once `shutdown` broadcasts.
    ///
    /// # Errors
    ///
    /// Anything [`Herald::assemble`] fails with, or a bind failure.
    pub async fn start(&self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<Running> {
        let state = self.assemble().await?;
        let server = ApiServer::new(&self.server, state.clone()).await?;
        let address = server.local_addr()?;

        let orchestrator = state.orchestrator.clone();
        let (http_shutdown, workflow_shutdown) = (shutdown.subscribe(), shutdown.subscribe());
        let services = tokio::spawn(async move {
            tokio::try_join!(
                async { server.serve(http_shutdown).await.map_err(anyhow::Error::from) },
                async {
                    orchestrator
                        .serve(workflow_shutdown)
                        .await
                        .map_err(anyhow::Error::from)
                },
            )?;
            Ok(())
        });

        state.health.set_orchestrator_ready(true);
        internal!(level = INFO, address = %address, "Herald started");

        Ok(Running {
            address,
            state,
            services,
        })
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if any component fails to
    /// initialise or stops with an error.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());
        herald_metrics::init_metrics(&self.metrics)?;

        internal!("Controller running");

        let running = self.start(&SHUTDOWN_BROADCAST).await?;

        let ret = tokio::select! {
            r = running.wait() => r,
            r = shutdown() => r,
        };

        internal!("Shutting down...");

        ret
    }
}
