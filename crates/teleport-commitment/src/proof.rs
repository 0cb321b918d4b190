//! Inclusion proof generation and verification.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::{
    error::CommitmentError, event::MigrationEvent, leaf::CommitmentScheme, log::LogSnapshot,
    tree::hash_pair, tree::CommitmentTree, Hash,
};

/// Proof data structure for demonstrating inclusion of a migration event in a commitment root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// The proven event
    pub event: MigrationEvent,
    /// Leaf digest of the event
    pub leaf: Hash,
    /// Sibling hashes from the leaf up to the root
    pub proof: Vec<Hash>,
    /// Root of the tree the proof was generated against
    pub root: Hash,
    /// Position of the event in the log
    pub leaf_index: usize,
    /// Total number of leaves in the tree
    pub leaf_count: usize,
    /// Leaf and pairing scheme used to build the tree
    #[serde(default)]
    pub scheme: CommitmentScheme,
}

impl InclusionProof {
    /// Check the proof against its own root.
    ///
    /// NOTE that this only shows internal consistency: the root still has to be compared
    /// with the root published on the destination ledger.
    pub fn verify(&self) -> bool {
        self.event.leaf() == self.leaf && verify(&self.leaf, &self.proof, &self.root)
    }

    /// Claim calldata accepted by the destination side
    pub fn claim_calldata(&self) -> Bytes {
        encode_claim(&self.event, &self.proof)
    }
}

/// Generate an inclusion proof for `asset_id` over the given snapshot
pub fn prove(asset_id: U256, snapshot: &LogSnapshot) -> Result<InclusionProof, CommitmentError> {
    if snapshot.position_of(&asset_id).is_none() {
        return Err(CommitmentError::NotFound(asset_id));
    }
    let tree = CommitmentTree::build(snapshot.events());
    prove_with_tree(asset_id, snapshot, &tree).ok_or(CommitmentError::NotFound(asset_id))
}

/// Generate an inclusion proof using a tree already built over `snapshot`
pub fn prove_with_tree(
    asset_id: U256,
    snapshot: &LogSnapshot,
    tree: &CommitmentTree,
) -> Option<InclusionProof> {
    let leaf_index = snapshot.position_of(&asset_id)?;
    let event = snapshot.events()[leaf_index].clone();
    Some(InclusionProof {
        leaf: *tree.leaves().get(leaf_index)?,
        proof: tree.proof_path(leaf_index)?,
        root: tree.root()?,
        leaf_index,
        leaf_count: tree.leaf_count(),
        scheme: CommitmentScheme::V1,
        event,
    })
}

/// Verify that `leaf` is included under `root`.
///
/// Pure function of its inputs, using the same sorted-pair rule as the tree builder.
pub fn verify(leaf: &Hash, proof: &[Hash], root: &Hash) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |running, sibling| hash_pair(&running, sibling));
    &computed == root
}

/// ABI-encode `(uint256 assetId, address owner, string metadata, bytes32[] proof)`
pub fn encode_claim(event: &MigrationEvent, proof: &[Hash]) -> Bytes {
    (
        event.source_asset_id,
        event.owner,
        event.metadata_digest.clone(),
        proof.to_vec(),
    )
        .abi_encode_params()
        .into()
}
