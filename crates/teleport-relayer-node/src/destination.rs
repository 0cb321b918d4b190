//! Destination ledger client for the Merkle verifier contract.

use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockId, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::publisher::{DestinationRoot, PublishError, PublishedRoot, RootSubmitter};

sol! {
    #[sol(rpc)]
    contract MerkleVerifier {
        event MerkleRootUpdated(bytes32 indexed root, uint256 blockNumber);

        function updateMerkleRoot(bytes32 newRoot) external;
        function currentMerkleRoot() external view returns (bytes32);
        function verify(bytes32 leaf, bytes32[] calldata proof) external view returns (bool);
    }
}

/// Errors setting up the destination client
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("invalid RPC URL: {0}")]
    InvalidUrl(String),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("RPC call failed: {0}")]
    Rpc(#[from] alloy::transports::TransportError),
    #[error("network mismatch: expected chain {expected}, got {got}")]
    NetworkMismatch { expected: u64, got: u64 },
}

#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Destination ledger RPC URL
    pub rpc_url: String,
    /// Address of the Merkle verifier contract
    pub verifier: Address,
    /// Hex private key of the relayer account
    pub private_key: String,
    /// Expected chain id; checked on connect when set
    pub chain_id: Option<u64>,
    /// Blocks built on top of the update before it counts as confirmed
    pub confirmations: u64,
    /// Receipt polling interval while waiting for confirmation
    pub receipt_poll_interval: Duration,
}

/// Alloy-based client submitting roots with a local signer
pub struct DestinationClient {
    config: DestinationConfig,
    provider: RootProvider<Http<Client>>,
    wallet: EthereumWallet,
    signer_address: Address,
    chain_id: u64,
}

impl DestinationClient {
    /// Create the client and check the chain it is connected to
    pub async fn connect(config: DestinationConfig) -> Result<Self, DestinationError> {
        let provider = ProviderBuilder::new().on_http(
            config
                .rpc_url
                .parse::<reqwest::Url>()
                .map_err(|e| DestinationError::InvalidUrl(e.to_string()))?,
        );

        let key_hex = config
            .private_key
            .strip_prefix("0x")
            .unwrap_or(&config.private_key);
        let signer = key_hex
            .parse::<PrivateKeySigner>()
            .map_err(|e| DestinationError::InvalidPrivateKey(e.to_string()))?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let chain_id = provider.get_chain_id().await?;
        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                return Err(DestinationError::NetworkMismatch {
                    expected,
                    got: chain_id,
                });
            }
        }
        info!(
            "Destination client connected: chain {}, verifier {}, relayer account {}",
            chain_id, config.verifier, signer_address
        );

        Ok(Self {
            config,
            provider,
            wallet,
            signer_address,
            chain_id,
        })
    }

    fn verifier(
        &self,
    ) -> MerkleVerifier::MerkleVerifierInstance<Http<Client>, RootProvider<Http<Client>>> {
        MerkleVerifier::new(self.config.verifier, self.provider.clone())
    }

    /// Sign and broadcast an `updateMerkleRoot` transaction
    async fn send_update(&self, root: B256) -> Result<TxHash, PublishError> {
        let calldata = MerkleVerifier::updateMerkleRootCall { newRoot: root }.abi_encode();
        let tx = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(self.config.verifier)
            .with_input(Bytes::from(calldata));

        let submission =
            |e: alloy::transports::TransportError| PublishError::Submission(e.to_string());
        let gas_limit = self.provider.estimate_gas(&tx).await.map_err(submission)?;
        let gas_price = self.provider.get_gas_price().await.map_err(submission)?;
        let nonce = self
            .provider
            .get_transaction_count(self.signer_address)
            .await
            .map_err(submission)?;

        let tx = tx
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce);

        let tx_envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| PublishError::Submission(e.to_string()))?;
        let pending = self
            .provider
            .send_tx_envelope(tx_envelope)
            .await
            .map_err(submission)?;

        debug!("Root update {} broadcast with nonce {}", pending.tx_hash(), nonce);
        Ok(*pending.tx_hash())
    }

    /// Wait until the transaction is buried under `confirmations` blocks; returns its block number
    async fn wait_confirmed(&self, tx_hash: TxHash) -> Result<u64, PublishError> {
        let confirmation =
            |e: alloy::transports::TransportError| PublishError::Confirmation(e.to_string());
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(confirmation)?;
            if let Some(receipt) = receipt {
                if !receipt.status() {
                    return Err(PublishError::Reverted(tx_hash.to_string()));
                }
                let included = receipt.block_number.ok_or_else(|| {
                    PublishError::Confirmation(format!("receipt of {tx_hash} has no block number"))
                })?;
                let head = self.provider.get_block_number().await.map_err(confirmation)?;
                let depth = (head + 1).saturating_sub(included);
                if depth >= self.config.confirmations {
                    return Ok(included);
                }
                debug!(
                    "Root update {} at depth {}/{}",
                    tx_hash, depth, self.config.confirmations
                );
            }
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl RootSubmitter for DestinationClient {
    async fn submit_root(&self, root: B256) -> Result<PublishedRoot, PublishError> {
        let tx_hash = self.send_update(root).await?;
        let published_at = self.wait_confirmed(tx_hash).await?;
        Ok(PublishedRoot {
            root,
            published_at,
            tx_ref: Some(tx_hash.to_string()),
        })
    }

    async fn current_root(&self) -> Result<DestinationRoot, PublishError> {
        let query = |e: alloy::transports::TransportError| PublishError::Query(e.to_string());
        let block_number = self.provider.get_block_number().await.map_err(query)?;
        let root = self
            .verifier()
            .currentMerkleRoot()
            .block(BlockId::number(block_number))
            .call()
            .await
            .map_err(|e| PublishError::Query(e.to_string()))?
            ._0;
        Ok(DestinationRoot { root, block_number })
    }

    async fn verify_leaf(&self, leaf: B256, proof: Vec<B256>) -> Result<bool, PublishError> {
        Ok(self
            .verifier()
            .verify(leaf, proof)
            .call()
            .await
            .map_err(|e| PublishError::Query(e.to_string()))?
            ._0)
    }
}
