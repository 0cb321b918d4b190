//! Source-ledger JSON-RPC client for polling teleport logs with retry logic.

use alloy::primitives::{Address, U64};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::abi::TeleportInitiated;

/// Error types for source-ledger RPC operations
#[derive(Error, Debug)]
pub enum SourceClientError {
    /// RPC client errors
    #[error("RPC client error: {0}")]
    RpcClient(#[from] jsonrpsee::core::client::Error),
    /// Invalid HTTP header value
    #[error("Invalid HTTP header value")]
    InvalidHeader,
    /// Log payload does not match the `TeleportInitiated` ABI
    #[error("Failed to decode teleport log: {0}")]
    Decode(#[from] alloy::sol_types::Error),
    /// Log has no block number or log index (pending log)
    #[error("Log is missing its block number or log index")]
    MissingPosition,
}

impl SourceClientError {
    /// Whether the error comes from the transport rather than from the data
    pub fn is_transport(&self) -> bool {
        matches!(self, SourceClientError::RpcClient(_))
    }
}

/// Default HTTP request timeout
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Read access to the source ledger needed by the event source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogFetcher: Send + Sync {
    /// Latest block number that has at least `lag` blocks built on top of it
    async fn safe_head(&self, lag: u64) -> Result<u64, SourceClientError>;

    /// Teleport logs emitted in the inclusive block range `[from, to]`
    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<Log>, SourceClientError>;
}

/// Source-ledger RPC client
pub struct SourceClient {
    client: HttpClient,
    contract: Address,
    backoff: backoff::ExponentialBackoff,
}

impl SourceClient {
    /// Create a new client for the given source contract with default retry settings (exponential backoff)
    pub fn new(
        url: String,
        userpwd: Option<String>,
        contract: Address,
    ) -> Result<Self, SourceClientError> {
        let mut headers = HeaderMap::new();
        if let Some(userpwd) = userpwd {
            let creds = general_purpose::STANDARD.encode(userpwd);
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Basic {creds}"))
                    .map_err(|_| SourceClientError::InvalidHeader)?,
            );
        };

        let client = HttpClient::builder()
            .set_headers(headers)
            .request_timeout(HTTP_REQUEST_TIMEOUT)
            .build(url)?;

        Ok(Self {
            client,
            contract,
            backoff: backoff::ExponentialBackoff::default(),
        })
    }

    /// Override the per-request retry policy
    pub fn with_backoff(mut self, backoff: backoff::ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Address of the watched source contract
    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<T, SourceClientError> {
        request_with_retry(self.backoff.clone(), || async {
            self.client
                .request(method, params.clone())
                .await
                .map_err(Into::into)
        })
        .await
    }

    /// Get current chain height
    pub async fn get_block_number(&self) -> Result<u64, SourceClientError> {
        let result: U64 = self.request("eth_blockNumber", rpc_params![]).await?;
        Ok(result.to::<u64>())
    }

    /// Get `TeleportInitiated` logs of the watched contract in the inclusive block range
    pub async fn get_teleport_logs(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, SourceClientError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(TeleportInitiated::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);
        let logs: Vec<Log> = self.request("eth_getLogs", rpc_params![filter]).await?;
        debug!("Fetched {} logs in blocks {}..={}", logs.len(), from, to);
        Ok(logs)
    }
}

#[async_trait]
impl LogFetcher for SourceClient {
    async fn safe_head(&self, lag: u64) -> Result<u64, SourceClientError> {
        Ok(self.get_block_number().await?.saturating_sub(lag))
    }

    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<Log>, SourceClientError> {
        self.get_teleport_logs(from, to).await
    }
}

/// Execute a request with retry logic using exponential backoff
/// Only retries on transport-level errors (not JSON-RPC errors or decode failures)
async fn request_with_retry<F, Fut, T>(
    backoff: backoff::ExponentialBackoff,
    operation: F,
) -> Result<T, SourceClientError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceClientError>>,
{
    use backoff::{future::retry_notify, Error};

    retry_notify(
        backoff,
        || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(err) => {
                    if is_retryable_error(&err) {
                        Err(Error::transient(err))
                    } else {
                        Err(Error::permanent(err))
                    }
                }
            }
        },
        |err, duration| {
            info!("Request failed, retrying in {:?}: {}", duration, err);
        },
    )
    .await
}

/// Determines if an error should be retried
fn is_retryable_error(err: &SourceClientError) -> bool {
    match err {
        SourceClientError::RpcClient(rpc_err) => {
            use jsonrpsee::core::client::Error as RpcError;
            matches!(
                rpc_err,
                RpcError::Transport(_)
                    | RpcError::RequestTimeout
                    | RpcError::RestartNeeded(_)
                    | RpcError::ServiceDisconnect
            )
        }
        _ => false,
    }
}
