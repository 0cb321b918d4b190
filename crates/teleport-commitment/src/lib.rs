//! Merkle commitment primitives for the Teleport relayer
//!
//! This crate provides functionality shared by the relayer node and the claim client:
//! migration events and their leaf digest, the append-only commitment log, the
//! commitment tree built over the log, and inclusion proof generation/verification.

pub mod error;
pub mod event;
pub mod leaf;
pub mod log;
pub mod proof;
pub mod tree;

pub use error::CommitmentError;
pub use event::MigrationEvent;
pub use leaf::{digest, CommitmentScheme};
pub use log::{AppendOutcome, CommitmentLog, LogSnapshot};
pub use proof::{encode_claim, prove, prove_with_tree, verify, InclusionProof};
pub use tree::{hash_pair, CommitmentTree};

/// 32-byte digest used for leaves, inner nodes and roots
pub type Hash = alloy_primitives::B256;
