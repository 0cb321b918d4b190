//! File sink for inclusion proofs, one JSON file per asset.

use std::path::PathBuf;

use alloy::primitives::U256;
use teleport_commitment::InclusionProof;
use tokio::fs;
use tracing::{debug, info};

/// Configuration for the proof sink
#[derive(Debug, Clone)]
pub struct ProofSinkConfig {
    /// Output directory for the proof JSON files
    pub output_dir: PathBuf,
    /// Number of asset ids per shard directory
    pub shard_size: u64,
}

/// Sink writing the proof of each newly committed asset as of the tree it was added to
pub struct ProofSink {
    config: ProofSinkConfig,
}

impl ProofSink {
    /// Create a new proof sink with the given configuration
    pub async fn new(config: ProofSinkConfig) -> Result<Self, anyhow::Error> {
        fs::create_dir_all(&config.output_dir).await?;

        info!(
            "ProofSink initialized with output_dir: {:?}, shard_size: {}",
            config.output_dir, config.shard_size
        );

        Ok(Self { config })
    }

    /// Calculate the shard directory path for a given asset id
    fn get_shard_dir(&self, asset_id: U256) -> PathBuf {
        let shard_size = U256::from(self.config.shard_size.max(1));
        let shard_start = asset_id / shard_size * shard_size;
        let shard_end = shard_start.saturating_add(shard_size);
        self.config.output_dir.join(shard_end.to_string())
    }

    /// Get the file path for a specific asset id
    fn get_file_path(&self, asset_id: U256) -> PathBuf {
        self.get_shard_dir(asset_id)
            .join(format!("asset_{asset_id}.json"))
    }

    /// Write an inclusion proof to its JSON file
    pub async fn write_proof(&mut self, proof: &InclusionProof) -> Result<(), anyhow::Error> {
        let asset_id = proof.event.source_asset_id;
        let file_path = self.get_file_path(asset_id);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json_content = serde_json::to_string_pretty(proof)?;
        fs::write(&file_path, json_content).await?;

        debug!("Proof for asset {} written to {:?}", asset_id, file_path);

        Ok(())
    }
}
