//! Events as seen on the transport, with their ledger position.

use std::fmt;

use alloy::rpc::types::Log;
use serde::{Deserialize, Serialize};
use teleport_commitment::MigrationEvent;

/// The ledger's own identifier of a log entry: block number and index within the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

/// Durable cursor: every log at or below this position has been processed
pub type Watermark = LogPosition;

impl LogPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// Position past every log of `block_number`
    pub fn end_of_block(block_number: u64) -> Self {
        Self::new(block_number, u64::MAX)
    }

    pub fn is_end_of_block(&self) -> bool {
        self.log_index == u64::MAX
    }

    /// First block that still has to be scanned when resuming from this watermark
    pub fn resume_block(&self) -> u64 {
        if self.is_end_of_block() {
            self.block_number + 1
        } else {
            self.block_number
        }
    }

    /// Position of an RPC log, `None` for pending logs
    pub fn of(log: &Log) -> Option<Self> {
        Some(Self::new(log.block_number?, log.log_index?))
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_block() {
            write!(f, "#{}:end", self.block_number)
        } else {
            write!(f, "#{}:{}", self.block_number, self.log_index)
        }
    }
}

/// A decoded migration event and where it was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub event: MigrationEvent,
    pub position: LogPosition,
}
