//! Pipeline server owning the commitment log, and the client used to feed it observed events.

use std::sync::Arc;

use alloy::primitives::{B256, U256};
use teleport_commitment::{
    prove_with_tree, AppendOutcome, CommitmentLog, CommitmentTree, InclusionProof, LogSnapshot,
};
use teleport_source_client::{ObservedEvent, Watermark};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::{
    proof_sink::{ProofSink, ProofSinkConfig},
    status::{PipelineStage, StatusBoard},
    store::AppStore,
};

/// Request sent to the application server via the API channel
pub struct ApiRequest {
    /// The body of the API request containing the specific operation
    pub body: ApiRequestBody,
    /// Channel to send the response back to the caller
    pub tx_response: oneshot::Sender<ApiResponse>,
}

pub type ApiResponse = Result<ApiResponseBody, anyhow::Error>;

/// Possible request operations that can be sent to the application server
pub enum ApiRequestBody {
    /// Get the durable source watermark
    GetWatermark(),
    /// Persist and append an observed event, then rebuild the commitment
    AppendEvent(ObservedEvent),
    /// Persist a watermark reached without new events
    Checkpoint(Watermark),
}

/// Response body for API requests containing the result data
pub enum ApiResponseBody {
    /// Response containing the watermark, if any
    GetWatermark(Option<Watermark>),
    /// Response containing the result of the append
    AppendEvent(AppendOutcome),
    /// Checkpoint persisted
    Checkpoint(),
}

/// Log snapshot together with the tree built over it
#[derive(Debug, Clone, Default)]
pub struct Commitment {
    pub snapshot: LogSnapshot,
    pub tree: Arc<CommitmentTree>,
}

impl Commitment {
    pub fn build(snapshot: LogSnapshot) -> Self {
        let tree = Arc::new(CommitmentTree::build(snapshot.events()));
        Self { snapshot, tree }
    }

    pub fn root(&self) -> Option<B256> {
        self.tree.root()
    }

    pub fn leaf_count(&self) -> usize {
        self.tree.leaf_count()
    }

    pub fn proof_of(&self, asset_id: U256) -> Option<InclusionProof> {
        prove_with_tree(asset_id, &self.snapshot, &self.tree)
    }

    /// Proof of the most recently appended event
    pub fn newest_proof(&self) -> Option<InclusionProof> {
        let newest = self.snapshot.events().last()?;
        self.proof_of(newest.source_asset_id)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Api requests channel capacity
    pub api_requests_capacity: usize,
    /// Proof files output (optional)
    pub proof_sink: Option<ProofSinkConfig>,
}

/// The pipeline server: the only writer of the commitment log
pub struct AppServer {
    config: AppConfig,
    store: Arc<AppStore>,
    tx_commitment: watch::Sender<Commitment>,
    status: StatusBoard,
    rx_requests: mpsc::Receiver<ApiRequest>,
    rx_shutdown: broadcast::Receiver<()>,
}

/// Client for communicating with the application server via async channels
#[derive(Clone)]
pub struct AppClient {
    tx_requests: mpsc::Sender<ApiRequest>,
}

impl AppServer {
    pub fn new(
        config: AppConfig,
        store: Arc<AppStore>,
        tx_commitment: watch::Sender<Commitment>,
        status: StatusBoard,
        rx_requests: mpsc::Receiver<ApiRequest>,
        rx_shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store,
            tx_commitment,
            status,
            rx_requests,
            rx_shutdown,
        }
    }

    async fn run_inner(&mut self) -> Result<(), anyhow::Error> {
        info!("App server started");

        let mut log = CommitmentLog::restore(self.store.load_events().await?)?;
        let watermark = self.store.get_watermark().await?;
        let commitment = Commitment::build(log.snapshot());
        info!(
            "Commitment log restored: {} events, root {}",
            log.len(),
            commitment
                .root()
                .map_or_else(|| "none".to_string(), |root| root.to_string())
        );
        self.status.update(|status| {
            status.log_len = log.len();
            status.root = commitment.root();
            status.watermark = watermark;
        });
        self.tx_commitment.send_replace(commitment);

        let mut sink = match &self.config.proof_sink {
            Some(sink_config) => Some(ProofSink::new(sink_config.clone()).await?),
            None => None,
        };

        loop {
            tokio::select! {
                Some(req) = self.rx_requests.recv() => {
                    let res = match req.body {
                        ApiRequestBody::GetWatermark() => self
                            .store
                            .get_watermark()
                            .await
                            .map(ApiResponseBody::GetWatermark)
                            .map_err(Into::into),
                        ApiRequestBody::AppendEvent(observed) => self
                            .append_event(&mut log, sink.as_mut(), observed)
                            .await
                            .map(ApiResponseBody::AppendEvent),
                        ApiRequestBody::Checkpoint(watermark) => self
                            .checkpoint(watermark)
                            .await
                            .map(|_| ApiResponseBody::Checkpoint()),
                    };
                    // Storage failures abort the pipeline after the requester is told
                    let res = match res {
                        Ok(body) => Ok(body),
                        Err(err) => {
                            let _ = req.tx_response.send(Err(anyhow::anyhow!(err.to_string())));
                            return Err(err);
                        }
                    };
                    if req.tx_response.send(res).is_err() {
                        warn!("Requester dropped before receiving the response");
                    }
                },
                _ = self.rx_shutdown.recv() => {
                    return Ok(())
                }
            }
        }
    }

    async fn append_event(
        &self,
        log: &mut CommitmentLog,
        sink: Option<&mut ProofSink>,
        observed: ObservedEvent,
    ) -> Result<AppendOutcome, anyhow::Error> {
        let ObservedEvent { event, position } = observed;
        let asset_id = event.source_asset_id;

        if log.contains(&asset_id) {
            // Nothing to rebuild, only the source cursor moves
            let outcome = log.append(event);
            self.store.set_watermark(&position).await?;
            self.status.update(|status| status.watermark = Some(position));
            return Ok(outcome);
        }

        self.status.set_stage(PipelineStage::Appending);
        self.store
            .append_event(log.len(), &ObservedEvent { event: event.clone(), position })
            .await?;
        let outcome = log.append(event);

        self.status.set_stage(PipelineStage::Rebuilding);
        let commitment = Commitment::build(log.snapshot());
        info!(
            "Asset {} appended at {:?}, observed at {}, {} leaves, root {}",
            asset_id,
            outcome,
            position,
            commitment.leaf_count(),
            commitment.root().unwrap_or_default()
        );

        let proof = commitment.proof_of(asset_id);
        self.status.update(|status| {
            status.stage = PipelineStage::Observing;
            status.log_len = log.len();
            status.root = commitment.root();
            status.watermark = Some(position);
        });
        self.tx_commitment.send_replace(commitment);

        // Proof files are optional output, the log stays the source of truth
        if let (Some(sink), Some(proof)) = (sink, proof) {
            if let Err(err) = sink.write_proof(&proof).await {
                error!("Failed to write proof of asset {}: {}", asset_id, err);
            }
        }
        Ok(outcome)
    }

    async fn checkpoint(&self, watermark: Watermark) -> Result<(), anyhow::Error> {
        self.store.set_watermark(&watermark).await?;
        self.status
            .update(|status| status.watermark = Some(watermark));
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), ()> {
        match self.run_inner().await {
            Err(err) => {
                error!("App server exited: {}", err);
                Err(())
            }
            Ok(()) => {
                info!("App server terminated");
                Ok(())
            }
        }
    }
}

impl AppClient {
    pub fn new(tx_requests: mpsc::Sender<ApiRequest>) -> Self {
        Self { tx_requests }
    }

    /// Helper method to send a request and handle the response
    async fn send_request<T>(
        &self,
        body: ApiRequestBody,
        extract_response: impl FnOnce(ApiResponseBody) -> Option<T>,
    ) -> Result<T, anyhow::Error> {
        let (tx_response, rx_response) = oneshot::channel();
        self.tx_requests
            .send(ApiRequest { body, tx_response })
            .await
            .map_err(|_| anyhow::anyhow!("App server is not running"))?;

        let res = rx_response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to send request"))?;

        match res {
            Ok(response_body) => extract_response(response_body)
                .ok_or_else(|| anyhow::anyhow!("Unexpected response type")),
            Err(err) => Err(err),
        }
    }

    pub async fn get_watermark(&self) -> Result<Option<Watermark>, anyhow::Error> {
        self.send_request(ApiRequestBody::GetWatermark(), |response| match response {
            ApiResponseBody::GetWatermark(watermark) => Some(watermark),
            _ => None,
        })
        .await
    }

    pub async fn append_event(
        &self,
        observed: ObservedEvent,
    ) -> Result<AppendOutcome, anyhow::Error> {
        self.send_request(
            ApiRequestBody::AppendEvent(observed),
            |response| match response {
                ApiResponseBody::AppendEvent(outcome) => Some(outcome),
                _ => None,
            },
        )
        .await
    }

    pub async fn checkpoint(&self, watermark: Watermark) -> Result<(), anyhow::Error> {
        self.send_request(
            ApiRequestBody::Checkpoint(watermark),
            |response| match response {
                ApiResponseBody::Checkpoint() => Some(()),
                _ => None,
            },
        )
        .await
    }
}

/// Create app server and client
pub fn create_app(
    config: AppConfig,
    store: Arc<AppStore>,
    tx_commitment: watch::Sender<Commitment>,
    status: StatusBoard,
    rx_shutdown: broadcast::Receiver<()>,
) -> (AppServer, AppClient) {
    let (tx_requests, rx_requests) = mpsc::channel(config.api_requests_capacity);
    let server = AppServer::new(config, store, tx_commitment, status, rx_requests, rx_shutdown);
    let client = AppClient::new(tx_requests);
    (server, client)
}
