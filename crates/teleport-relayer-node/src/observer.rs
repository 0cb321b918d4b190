//! Source ledger observer feeding teleport events into the pipeline.

use alloy::primitives::Address;
use teleport_source_client::{
    EventSource, EventSourceConfig, LogFetcher, SourceClient, SourceItem,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    app::AppClient,
    status::{PipelineStage, StatusBoard},
};

/// Drives the event source and hands every item to the pipeline
pub struct Observer {
    /// Observer configuration
    config: ObserverConfig,
    /// App client
    app_client: AppClient,
    /// Relayer status
    status: StatusBoard,
    /// Shutdown signal receiver
    rx_shutdown: broadcast::Receiver<()>,
}

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Source ledger RPC URL
    pub rpc_url: String,
    /// Source ledger RPC user:password (optional)
    pub rpc_userpwd: Option<String>,
    /// Address of the source contract emitting `TeleportInitiated`
    pub contract: Address,
    /// Polling and range settings
    pub source: EventSourceConfig,
}

impl Observer {
    pub fn new(
        config: ObserverConfig,
        app_client: AppClient,
        status: StatusBoard,
        rx_shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            app_client,
            status,
            rx_shutdown,
        }
    }

    async fn run_inner(&mut self) -> Result<(), anyhow::Error> {
        info!("Source observer started");

        let client = SourceClient::new(
            self.config.rpc_url.clone(),
            self.config.rpc_userpwd.clone(),
            self.config.contract,
        )?;
        info!(
            "Source RPC client initialized for contract {}",
            self.config.contract
        );

        let watermark = self.app_client.get_watermark().await?;
        let source = EventSource::new(client, self.config.source.clone(), watermark);
        self.observe(source).await
    }

    async fn observe<F: LogFetcher>(
        &mut self,
        mut source: EventSource<F>,
    ) -> Result<(), anyhow::Error> {
        self.status.set_stage(PipelineStage::Observing);

        loop {
            tokio::select! {
                item = source.next() => {
                    if let Err(err) = self.forward(item).await {
                        // The app server may stop before answering once shutdown is signaled
                        if self.shutdown_requested() {
                            info!("Pipeline closed during shutdown: {}", err);
                            return Ok(());
                        }
                        return Err(err);
                    }
                },
                _ = self.rx_shutdown.recv() => {
                    return Ok(())
                }
            }
        }
    }

    async fn forward(&self, item: SourceItem) -> Result<(), anyhow::Error> {
        match item {
            SourceItem::Event(observed) => {
                let position = observed.position;
                let outcome = self.app_client.append_event(observed).await?;
                debug!("Event at {} processed: {:?}", position, outcome);
            }
            SourceItem::Checkpoint(watermark) => {
                self.app_client.checkpoint(watermark).await?;
                debug!("Source scanned up to {}", watermark);
            }
        }
        Ok(())
    }

    fn shutdown_requested(&mut self) -> bool {
        !matches!(
            self.rx_shutdown.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    pub async fn run(&mut self) -> Result<(), ()> {
        match self.run_inner().await {
            Err(err) => {
                error!("Source observer exited: {}", err);
                Err(())
            }
            Ok(()) => {
                info!("Source observer terminated");
                Ok(())
            }
        }
    }
}
