//! HTTP RPC server providing REST endpoints for inclusion proofs, roots and relayer status.

use std::{path::PathBuf, str::FromStr, sync::Arc};

use alloy::primitives::{Bytes, B256, U256};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use teleport_commitment::InclusionProof;
use teleport_source_client::Watermark;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    app::Commitment,
    publisher::PublishedRoot,
    status::{RelayerState, StatusBoard},
    store::AppStore,
};

/// Default number of entries returned by `/published`
const DEFAULT_PUBLISHED_LIMIT: u32 = 20;
/// Maximum number of entries returned by `/published`
const MAX_PUBLISHED_LIMIT: u32 = 1000;

/// Query parameters for the published roots history
#[derive(Debug, Deserialize)]
pub struct PublishedQuery {
    pub limit: Option<u32>,
}

/// Inclusion proof together with the calldata a claimant submits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResponse {
    #[serde(flatten)]
    pub proof: InclusionProof,
    /// ABI-encoded `(uint256, address, string, bytes32[])` claim arguments
    pub calldata: Bytes,
    /// Whether the proof's root is the last root published on the destination ledger
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub root: Option<B256>,
    pub leaf_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: RelayerState,
    /// Why publishing is suspended, when degraded or halted
    pub reason: Option<String>,
    pub log_len: usize,
    pub root: Option<B256>,
    pub watermark: Option<Watermark>,
    pub last_published: Option<PublishedRoot>,
}

/// Configuration for the RPC server
#[derive(Clone)]
pub struct RpcConfig {
    /// Host and port binding for the RPC server (e.g., "127.0.0.1:5000")
    pub rpc_host: String,
    /// Path to the relayer database
    pub db_path: PathBuf,
}

/// HTTP RPC server serving proofs from the latest commitment
pub struct RpcServer {
    config: RpcConfig,
    rx_commitment: watch::Receiver<Commitment>,
    status: StatusBoard,
    rx_shutdown: broadcast::Receiver<()>,
}

#[derive(Clone)]
pub struct AppState {
    commitments: watch::Receiver<Commitment>,
    status: StatusBoard,
    store: Arc<AppStore>,
}

impl AppState {
    pub fn new(
        commitments: watch::Receiver<Commitment>,
        status: StatusBoard,
        store: Arc<AppStore>,
    ) -> Self {
        Self {
            commitments,
            status,
            store,
        }
    }

    fn latest(&self) -> Commitment {
        self.commitments.borrow().clone()
    }
}

impl RpcServer {
    pub fn new(
        config: RpcConfig,
        rx_commitment: watch::Receiver<Commitment>,
        status: StatusBoard,
        rx_shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            rx_commitment,
            status,
            rx_shutdown,
        }
    }

    async fn run_inner(&self) -> Result<(), std::io::Error> {
        info!("Starting RPC server on {}", self.config.rpc_host);

        let store = Arc::new(AppStore::multiple_concurrent_readers(&self.config.db_path));
        let app_state = AppState::new(self.rx_commitment.clone(), self.status.clone(), store);

        let app = Router::new()
            .route("/proof/:asset_id", get(get_proof))
            .route("/root", get(get_root))
            .route("/status", get(get_status))
            .route("/published", get(get_published))
            .route("/publish/retry", post(retry_publish))
            .with_state(app_state)
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&self.config.rpc_host).await?;
        let mut rx_shutdown = self.rx_shutdown.resubscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { rx_shutdown.recv().await.unwrap_or_default() })
            .await
    }

    pub async fn run(&self) -> Result<(), ()> {
        match self.run_inner().await {
            Err(err) => {
                error!("RPC server exited: {}", err);
                Err(())
            }
            Ok(()) => {
                info!("RPC server terminated");
                Ok(())
            }
        }
    }
}

/// Generate an inclusion proof for an asset against the latest commitment
///
/// # Arguments
/// * `asset_id` - Source asset id, decimal or `0x`-prefixed hex
///
/// # Returns
/// * `Json<ProofResponse>` - The proof, claim calldata and publication flag
/// * `StatusCode::BAD_REQUEST` - If the asset id cannot be parsed
/// * `StatusCode::NOT_FOUND` - If the asset is not in the log
pub async fn get_proof(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<ProofResponse>, StatusCode> {
    let asset_id = U256::from_str(&asset_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let proof = state
        .latest()
        .proof_of(asset_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let published = state
        .status
        .current()
        .last_published
        .is_some_and(|last| last.root == proof.root);
    Ok(Json(ProofResponse {
        calldata: proof.claim_calldata(),
        published,
        proof,
    }))
}

/// Get the root of the latest commitment
pub async fn get_root(State(state): State<AppState>) -> Json<RootResponse> {
    let commitment = state.latest();
    Json(RootResponse {
        root: commitment.root(),
        leaf_count: commitment.leaf_count(),
    })
}

/// Get the relayer state and cursors
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.current();
    Json(StatusResponse {
        state: status.state(),
        reason: status.health_reason().map(str::to_string),
        log_len: status.log_len,
        root: status.root,
        watermark: status.watermark,
        last_published: status.last_published,
    })
}

/// Get the most recently published roots, newest first
///
/// # Returns
/// * `Json<Vec<PublishedRoot>>` - Up to `limit` roots
/// * `StatusCode::INTERNAL_SERVER_ERROR` - If reading the history fails
pub async fn get_published(
    State(state): State<AppState>,
    Query(query): Query<PublishedQuery>,
) -> Result<Json<Vec<PublishedRoot>>, StatusCode> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PUBLISHED_LIMIT)
        .min(MAX_PUBLISHED_LIMIT);
    let roots = state.store.get_published_roots(limit).await.map_err(|e| {
        error!("Failed to get published roots: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(roots))
}

/// Resume publishing out of the degraded state
///
/// # Returns
/// * `StatusCode::ACCEPTED` - Retry scheduled
/// * `StatusCode::CONFLICT` - Publishing is not degraded
pub async fn retry_publish(State(state): State<AppState>) -> StatusCode {
    if state.status.request_retry() {
        info!("Publish retry requested over RPC");
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    }
}
