//! Append-only commitment log with copy-on-write snapshots.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::U256;
use tracing::{debug, warn};

use crate::{error::CommitmentError, event::MigrationEvent};

/// Result of appending an event to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was added at the given position
    Accepted { position: usize },
    /// The asset is already in the log; nothing changed
    Duplicate {
        /// Position of the event already in the log
        existing: usize,
        /// Whether the rejected event carried a different payload
        conflicting: bool,
    },
}

impl AppendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AppendOutcome::Accepted { .. })
    }
}

/// Ordered store of accepted migration events.
///
/// Events are never removed or mutated, so the log length only grows. The log is owned
/// by a single writer; readers get [`LogSnapshot`]s.
#[derive(Debug, Default)]
pub struct CommitmentLog {
    events: Arc<Vec<MigrationEvent>>,
    positions: HashMap<U256, usize>,
}

/// Point-in-time immutable view of the log.
///
/// Appends made after the snapshot was taken are not visible through it.
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot(Arc<Vec<MigrationEvent>>);

impl CommitmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted events, in their persisted order
    pub fn restore(
        events: impl IntoIterator<Item = MigrationEvent>,
    ) -> Result<Self, CommitmentError> {
        let mut log = Self::new();
        for event in events {
            let asset_id = event.source_asset_id;
            if !log.append(event).is_accepted() {
                return Err(CommitmentError::DuplicateInLog(asset_id));
            }
        }
        Ok(log)
    }

    /// Append an event unless its asset id is already present
    pub fn append(&mut self, event: MigrationEvent) -> AppendOutcome {
        if let Some(&existing) = self.positions.get(&event.source_asset_id) {
            let conflicting = self.events[existing] != event;
            if conflicting {
                warn!(
                    "Conflicting event for asset {} ignored, keeping the one at position {}",
                    event.source_asset_id, existing
                );
            } else {
                debug!("Duplicate event for asset {} ignored", event.source_asset_id);
            }
            return AppendOutcome::Duplicate {
                existing,
                conflicting,
            };
        }

        // Clones the backing vector only while a snapshot still references it
        let events = Arc::make_mut(&mut self.events);
        let position = events.len();
        self.positions.insert(event.source_asset_id, position);
        events.push(event);
        AppendOutcome::Accepted { position }
    }

    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot(self.events.clone())
    }

    pub fn contains(&self, asset_id: &U256) -> bool {
        self.positions.contains_key(asset_id)
    }

    pub fn get(&self, asset_id: &U256) -> Option<&MigrationEvent> {
        self.positions.get(asset_id).map(|&i| &self.events[i])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl LogSnapshot {
    pub fn events(&self) -> &[MigrationEvent] {
        &self.0
    }

    /// Position of the event for `asset_id`, if present
    pub fn position_of(&self, asset_id: &U256) -> Option<usize> {
        self.0.iter().position(|e| &e.source_asset_id == asset_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<MigrationEvent>> for LogSnapshot {
    fn from(events: Vec<MigrationEvent>) -> Self {
        Self(Arc::new(events))
    }
}
