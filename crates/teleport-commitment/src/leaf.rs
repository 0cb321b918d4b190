//! Leaf digest: the cross-chain encoding contract between the relayer and the destination verifier.
//!
//! Any change to the field order, the encoding or the hash function changes every leaf and
//! every root, and must ship as a new [`CommitmentScheme`] version on both sides.

use alloy_primitives::keccak256;
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::{event::MigrationEvent, Hash};

/// Versioned description of how leaves and inner nodes are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommitmentScheme {
    /// `keccak256(abi.encode(uint256 assetId, address owner, string metadata))` leaves,
    /// sorted-pair keccak256 inner nodes, odd trailing node promoted unchanged
    #[default]
    V1,
}

impl CommitmentScheme {
    pub fn version(&self) -> u8 {
        match self {
            CommitmentScheme::V1 => 1,
        }
    }
}

/// ABI encoding of the leaf fields: `(uint256, address, string)` as function parameters
pub fn encode_leaf(event: &MigrationEvent) -> Vec<u8> {
    (
        event.source_asset_id,
        event.owner,
        event.metadata_digest.clone(),
    )
        .abi_encode_params()
}

/// Compute the leaf committed for a migration event
///
/// `occurred_at` is deliberately not part of the leaf: the destination contract
/// rebuilds leaves from `(assetId, owner, metadata)` only.
pub fn digest(event: &MigrationEvent) -> Hash {
    keccak256(encode_leaf(event))
}
