use alloy_primitives::U256;
use thiserror::Error;

/// Errors produced by the commitment log and proof service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitmentError {
    /// Proof requested for an asset that is not in the snapshot
    #[error("No migration event found for asset {0}")]
    NotFound(U256),
    /// Persisted log contains the same asset twice
    #[error("Asset {0} appears more than once in the persisted log")]
    DuplicateInLog(U256),
}
