//! Functions to fetch the inclusion proof of a migrated asset from the Teleport relayer RPC.

use std::path::{Path, PathBuf};

use alloy_primitives::{Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use teleport_commitment::InclusionProof;
use tracing::{info, warn};

use crate::{format::format_claim, verify::verify_claim};

/// Proof of a migrated asset as served by the relayer, ready to be claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    #[serde(flatten)]
    pub proof: InclusionProof,
    /// ABI-encoded claim arguments
    pub calldata: Bytes,
    /// Whether the relayer has published the proof's root on the destination ledger
    pub published: bool,
}

/// Current commitment of the relayer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayerRoot {
    pub root: Option<B256>,
    pub leaf_count: usize,
}

/// CLI arguments for the `fetch` subcommand
#[derive(Clone, Debug, clap::Args)]
pub struct FetchArgs {
    /// Source asset id (decimal or 0x-prefixed hex)
    #[arg(long)]
    asset_id: U256,
    /// Path to save the proof
    #[arg(long)]
    proof_path: PathBuf,
    /// Teleport relayer RPC URL
    #[arg(long, env = "TELEPORT_RELAYER_RPC", default_value = "http://127.0.0.1:5000")]
    relayer_rpc_url: String,
    /// Verify the proof after fetching it
    #[arg(long, default_value = "false")]
    verify: bool,
}

/// Run the `fetch` subcommand: download a proof and write it to disk
///
/// Returns an error if the relayer does not know the asset, the request fails or the
/// proof cannot be written to the specified path.
pub async fn run(args: FetchArgs) -> Result<(), anyhow::Error> {
    let claim = fetch_claim_proof(&args.relayer_rpc_url, args.asset_id).await?;
    if !claim.published {
        warn!("Root {} is not published on the destination ledger yet", claim.proof.root);
    }

    save_claim_proof(&claim, &args.proof_path)?;

    if args.verify {
        verify_claim(&claim, None)?;
        println!("{}", format_claim(&claim));
    }

    Ok(())
}

/// Save a claim proof to disk as pretty-printed JSON
pub fn save_claim_proof(claim: &ClaimProof, proof_path: &Path) -> Result<(), anyhow::Error> {
    // Create parent directories if they don't exist
    if let Some(proof_dir) = proof_path.parent() {
        std::fs::create_dir_all(proof_dir)?;
    }

    std::fs::write(proof_path, serde_json::to_string_pretty(claim)?)?;
    info!("Proof written to {}", proof_path.display());
    Ok(())
}

/// Load a claim proof previously saved with `save_claim_proof`
pub fn load_claim_proof(proof_path: &Path) -> Result<ClaimProof, anyhow::Error> {
    info!("Loading proof from {}", proof_path.display());
    let content = std::fs::read_to_string(proof_path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Fetch the inclusion proof of an asset from the relayer RPC
///
/// - `relayer_rpc_url`: URL of the Teleport relayer RPC endpoint
/// - `asset_id`: Source asset id
pub async fn fetch_claim_proof(
    relayer_rpc_url: &str,
    asset_id: U256,
) -> Result<ClaimProof, anyhow::Error> {
    info!("Fetching inclusion proof for asset {} ...", asset_id);
    let url = format!("{}/proof/{}", relayer_rpc_url.trim_end_matches('/'), asset_id);
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("Accept-Encoding", "gzip")
        .send()
        .await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(anyhow::anyhow!(
            "Asset {} has not been committed by the relayer",
            asset_id
        ));
    }
    match response.error_for_status() {
        Ok(res) => Ok(res.json().await?),
        Err(e) => Err(e.into()),
    }
}

/// Get the current root from the relayer RPC
pub async fn get_relayer_root(relayer_rpc_url: &str) -> Result<RelayerRoot, anyhow::Error> {
    let url = format!("{}/root", relayer_rpc_url.trim_end_matches('/'));
    let response = reqwest::get(url).await?;
    match response.error_for_status() {
        Ok(res) => Ok(res.json().await?),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use teleport_commitment::{prove, CommitmentLog, MigrationEvent};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_claim(asset_id: u64) -> ClaimProof {
        let mut log = CommitmentLog::new();
        for id in 1..=5u64 {
            log.append(MigrationEvent::new(
                U256::from(id),
                Address::repeat_byte(id as u8),
                U256::from(1_700_000_000u64 + id),
                format!("bafy{id}"),
            ));
        }
        let proof = prove(U256::from(asset_id), &log.snapshot()).unwrap();
        ClaimProof {
            calldata: proof.claim_calldata(),
            published: true,
            proof,
        }
    }

    #[tokio::test]
    async fn test_fetch_claim_proof() {
        let server = MockServer::start().await;
        let claim = sample_claim(3);
        Mock::given(method("GET"))
            .and(path("/proof/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&claim))
            .mount(&server)
            .await;

        let fetched = fetch_claim_proof(&format!("{}/", server.uri()), U256::from(3))
            .await
            .unwrap();
        assert_eq!(fetched, claim);
    }

    #[tokio::test]
    async fn test_fetch_unknown_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch_claim_proof(&server.uri(), U256::from(99))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not been committed"));
    }

    #[tokio::test]
    async fn test_get_relayer_root() {
        let server = MockServer::start().await;
        let root = B256::repeat_byte(0xab);
        Mock::given(method("GET"))
            .and(path("/root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "root": root,
                "leaf_count": 4,
            })))
            .mount(&server)
            .await;

        assert_eq!(
            get_relayer_root(&server.uri()).await.unwrap(),
            RelayerRoot {
                root: Some(root),
                leaf_count: 4
            }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let proof_path = dir.path().join("claims").join("asset_2.json");
        let claim = sample_claim(2);

        save_claim_proof(&claim, &proof_path).unwrap();
        assert_eq!(load_claim_proof(&proof_path).unwrap(), claim);
    }
}
