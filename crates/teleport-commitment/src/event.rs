//! Migration events observed on the source ledger.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{leaf::digest, Hash};

/// An asset leaving the source ledger, as emitted by `TeleportInitiated`.
///
/// Events are immutable once observed and are identified by `source_asset_id`:
/// an asset migrates at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationEvent {
    /// Token id on the source ledger
    pub source_asset_id: U256,
    /// Owner that initiated the migration and will claim on the destination
    pub owner: Address,
    /// Source-ledger timestamp of the migration
    pub occurred_at: U256,
    /// Content hash of the asset metadata (e.g. an IPFS CID)
    pub metadata_digest: String,
}

impl MigrationEvent {
    pub fn new(
        source_asset_id: impl Into<U256>,
        owner: Address,
        occurred_at: impl Into<U256>,
        metadata_digest: impl Into<String>,
    ) -> Self {
        Self {
            source_asset_id: source_asset_id.into(),
            owner,
            occurred_at: occurred_at.into(),
            metadata_digest: metadata_digest.into(),
        }
    }

    /// Leaf committed for this event
    pub fn leaf(&self) -> Hash {
        digest(self)
    }
}
