//! Source contract ABI and log decoding.

use alloy::{rpc::types::Log, sol, sol_types::SolEvent};
use teleport_commitment::MigrationEvent;

use crate::{
    client::SourceClientError,
    observed::{LogPosition, ObservedEvent},
};

sol! {
    /// Emitted by the source NFT contract when an owner starts a teleport
    event TeleportInitiated(
        uint256 indexed tokenId,
        address indexed owner,
        uint256 timestamp,
        string metadataHash
    );
}

impl From<TeleportInitiated> for MigrationEvent {
    fn from(event: TeleportInitiated) -> Self {
        MigrationEvent {
            source_asset_id: event.tokenId,
            owner: event.owner,
            occurred_at: event.timestamp,
            metadata_digest: event.metadataHash,
        }
    }
}

/// Decode a `TeleportInitiated` log together with its position on the ledger
pub fn decode_observed(log: &Log) -> Result<ObservedEvent, SourceClientError> {
    let position = LogPosition::of(log).ok_or(SourceClientError::MissingPosition)?;
    let decoded = TeleportInitiated::decode_log_data(&log.inner.data, true)?;
    Ok(ObservedEvent {
        event: decoded.into(),
        position,
    })
}
