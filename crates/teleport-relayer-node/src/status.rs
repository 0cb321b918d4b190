//! Relayer state machine shared by the pipeline, the publish worker and the RPC server.

use std::sync::Arc;

use alloy::primitives::B256;
use serde::Serialize;
use teleport_source_client::Watermark;
use tokio::sync::watch;
use tracing::info;

use crate::publisher::PublishedRoot;

/// Externally visible relayer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayerState {
    /// Event subscription not started yet
    Idle,
    /// Waiting for source events
    Observing,
    /// Persisting and appending an event to the log
    Appending,
    /// Rebuilding the commitment tree
    Rebuilding,
    /// Submitting a root to the destination ledger
    Publishing,
    /// Publishing failed repeatedly; observing continues, publishing is suspended
    Degraded,
    /// Destination rejected our proof encoding; publishing stopped until restart
    Halted,
}

/// Stage of the ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStage {
    #[default]
    Idle,
    Observing,
    Appending,
    Rebuilding,
}

/// Health of the publishing side
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PublishHealth {
    #[default]
    Healthy,
    Degraded { reason: String },
    Halted { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct RelayerStatus {
    pub stage: PipelineStage,
    pub publishing: bool,
    pub health: PublishHealth,
    /// Operator asked to end the current degraded episode
    pub retry_requested: bool,
    /// Number of events in the commitment log
    pub log_len: usize,
    /// Root of the latest built tree
    pub root: Option<B256>,
    pub watermark: Option<Watermark>,
    pub last_published: Option<PublishedRoot>,
}

impl RelayerStatus {
    pub fn state(&self) -> RelayerState {
        match (&self.health, self.stage) {
            (PublishHealth::Halted { .. }, _) => RelayerState::Halted,
            (PublishHealth::Degraded { .. }, _) => RelayerState::Degraded,
            (_, PipelineStage::Appending) => RelayerState::Appending,
            (_, PipelineStage::Rebuilding) => RelayerState::Rebuilding,
            _ if self.publishing => RelayerState::Publishing,
            (_, PipelineStage::Observing) => RelayerState::Observing,
            (_, PipelineStage::Idle) => RelayerState::Idle,
        }
    }

    /// Reason publishing is suspended, if it is
    pub fn health_reason(&self) -> Option<&str> {
        match &self.health {
            PublishHealth::Healthy => None,
            PublishHealth::Degraded { reason } | PublishHealth::Halted { reason } => {
                Some(reason)
            }
        }
    }
}

/// Shared handle to the relayer status
#[derive(Clone)]
pub struct StatusBoard {
    tx_status: Arc<watch::Sender<RelayerStatus>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(RelayerStatus::default())
    }
}

impl StatusBoard {
    pub fn new(initial: RelayerStatus) -> Self {
        let (tx_status, _) = watch::channel(initial);
        Self {
            tx_status: Arc::new(tx_status),
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<RelayerStatus> {
        self.tx_status.subscribe()
    }

    pub fn current(&self) -> RelayerStatus {
        self.tx_status.borrow().clone()
    }

    pub fn state(&self) -> RelayerState {
        self.tx_status.borrow().state()
    }

    /// Apply a change, logging state transitions
    pub fn update(&self, modify: impl FnOnce(&mut RelayerStatus)) {
        let mut transition = None;
        self.tx_status.send_modify(|status| {
            let before = status.state();
            modify(status);
            let after = status.state();
            if before != after {
                transition = Some((before, after));
            }
        });
        if let Some((before, after)) = transition {
            info!("Relayer state: {:?} -> {:?}", before, after);
        }
    }

    pub fn set_stage(&self, stage: PipelineStage) {
        self.update(|status| status.stage = stage);
    }

    pub fn set_publishing(&self, publishing: bool) {
        self.update(|status| status.publishing = publishing);
    }

    pub fn degrade(&self, reason: String) {
        self.update(|status| {
            if !matches!(status.health, PublishHealth::Halted { .. }) {
                status.health = PublishHealth::Degraded { reason };
                status.retry_requested = false;
            }
        });
    }

    pub fn halt(&self, reason: String) {
        self.update(|status| status.health = PublishHealth::Halted { reason });
    }

    /// Leave `Degraded`; `Halted` is only cleared by a restart
    pub fn recover(&self) {
        self.update(|status| {
            if matches!(status.health, PublishHealth::Degraded { .. }) {
                status.health = PublishHealth::Healthy;
            }
            status.retry_requested = false;
        });
    }

    /// Ask the publish worker to retry now; returns `false` unless publishing is degraded
    pub fn request_retry(&self) -> bool {
        let mut accepted = false;
        self.update(|status| {
            if status.state() == RelayerState::Degraded {
                status.retry_requested = true;
                accepted = true;
            }
        });
        accepted
    }

    /// Wait for an operator retry request made during the current degraded episode
    pub async fn retry_requested(&self) {
        let mut rx = self.tx_status.subscribe();
        // The sender lives as long as `self`, so this only returns once requested
        let _ = rx.wait_for(|status| status.retry_requested).await;
    }
}
