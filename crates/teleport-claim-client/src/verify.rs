//! CLI wrapper for the offline claim verification

use std::path::PathBuf;

use alloy_primitives::B256;
use clap::Args;
use tracing::info;

use crate::fetch::{get_relayer_root, load_claim_proof, ClaimProof};
use crate::format::format_claim;

/// CLI arguments for the `verify` subcommand
#[derive(Clone, Debug, Args)]
pub struct VerifyArgs {
    /// Path to read the proof from
    #[arg(long)]
    proof_path: PathBuf,
    /// Root the proof must be anchored to, e.g. the one read from the verifier contract
    #[arg(long)]
    expected_root: Option<B256>,
    /// Teleport relayer RPC URL, used to get the expected root when it is not given
    #[arg(long, env = "TELEPORT_RELAYER_RPC")]
    relayer_rpc_url: Option<String>,
}

/// Run the `verify` subcommand: read a proof from disk and verify it
pub async fn run(args: VerifyArgs) -> Result<(), anyhow::Error> {
    let claim = load_claim_proof(&args.proof_path)?;

    let expected_root = match (args.expected_root, &args.relayer_rpc_url) {
        (Some(root), _) => Some(root),
        (None, Some(url)) => get_relayer_root(url).await?.root,
        (None, None) => None,
    };

    verify_claim(&claim, expected_root)?;
    println!("{}", format_claim(&claim));
    Ok(())
}

/// Check a claim proof without trusting the relayer
///
/// - the event digest matches the proven leaf
/// - the sibling path leads from the leaf to the proof's root
/// - the calldata encodes this event and path
/// - the root equals `expected_root`, when one is given
pub fn verify_claim(claim: &ClaimProof, expected_root: Option<B256>) -> Result<(), anyhow::Error> {
    let proof = &claim.proof;
    if proof.event.leaf() != proof.leaf {
        anyhow::bail!(
            "Leaf {} does not match the digest of asset {}",
            proof.leaf,
            proof.event.source_asset_id
        );
    }
    if !proof.verify() {
        anyhow::bail!("Proof path does not lead to root {}", proof.root);
    }
    if claim.calldata != proof.claim_calldata() {
        anyhow::bail!("Claim calldata does not match the proven event");
    }
    if let Some(expected) = expected_root {
        if expected != proof.root {
            anyhow::bail!(
                "Proof is anchored to root {} but the expected root is {}, fetch a fresh proof",
                proof.root,
                expected
            );
        }
    }

    info!(
        "Proof for asset {} verified against root {}",
        proof.event.source_asset_id, proof.root
    );
    Ok(())
}
