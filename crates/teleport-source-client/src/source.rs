//! Pull-based event source over the source ledger.
//!
//! [`EventSource::next`] yields decoded teleport events in discovery order (block number, then
//! log index) and checkpoints after every scanned block range. It never fails: transport errors
//! are logged and the source reconnects with exponential backoff, undecodable logs are dropped.

use std::collections::VecDeque;
use std::time::Duration;

use alloy::rpc::types::Log;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, error, info, warn};

use crate::abi::decode_observed;
use crate::client::{LogFetcher, SourceClientError};
use crate::observed::{LogPosition, ObservedEvent, Watermark};

/// Event source configuration
#[derive(Debug, Clone)]
pub struct EventSourceConfig {
    /// First block to scan when there is no persisted watermark
    pub start_block: u64,
    /// Number of blocks to stay behind the chain head
    pub confirmation_lag: u64,
    /// Maximum number of blocks requested in a single `eth_getLogs` call
    pub max_block_range: u64,
    /// Pause between polls once the source is caught up
    pub poll_interval: Duration,
    /// Upper bound for the reconnect delay
    pub max_reconnect_interval: Duration,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            confirmation_lag: 1,
            max_block_range: 1000,
            poll_interval: Duration::from_secs(10),
            max_reconnect_interval: Duration::from_secs(60),
        }
    }
}

/// Item produced by the event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceItem {
    /// A newly observed migration event
    Event(ObservedEvent),
    /// Everything up to and including this position has been processed
    Checkpoint(Watermark),
}

/// Lazy, infinite sequence of observed events
pub struct EventSource<F: LogFetcher> {
    fetcher: F,
    config: EventSourceConfig,
    /// Next block to scan
    next_block: u64,
    /// Highest position either resumed from or already handed out
    cursor: Option<LogPosition>,
    pending: VecDeque<SourceItem>,
    reconnect: ExponentialBackoff,
}

impl<F: LogFetcher> EventSource<F> {
    /// Create an event source resuming after `watermark`, or from the configured start block
    pub fn new(fetcher: F, config: EventSourceConfig, watermark: Option<Watermark>) -> Self {
        let next_block = watermark
            .map(|w| w.resume_block())
            .unwrap_or(config.start_block);
        let reconnect = ExponentialBackoff {
            max_interval: config.max_reconnect_interval,
            max_elapsed_time: None,
            ..Default::default()
        };
        info!(
            "Event source starting at block {} (watermark: {})",
            next_block,
            watermark.map_or_else(|| "none".to_string(), |w| w.to_string())
        );
        Self {
            fetcher,
            config,
            next_block,
            cursor: watermark,
            pending: VecDeque::new(),
            reconnect,
        }
    }

    /// Next block that will be requested from the ledger
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Wait for the next item; blocks indefinitely while the ledger is idle
    pub async fn next(&mut self) -> SourceItem {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return item;
            }
            match self.poll().await {
                Ok(true) => self.reconnect.reset(),
                Ok(false) => {
                    self.reconnect.reset();
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(err) => {
                    let delay = self
                        .reconnect
                        .next_backoff()
                        .unwrap_or(self.config.max_reconnect_interval);
                    warn!(
                        "Source ledger unavailable at block {}, reconnecting in {:?}: {}",
                        self.next_block, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Scan one block range; returns `false` if there was nothing new to scan
    async fn poll(&mut self) -> Result<bool, SourceClientError> {
        let safe_head = self.fetcher.safe_head(self.config.confirmation_lag).await?;
        if safe_head < self.next_block {
            debug!(
                "Caught up: safe head {} below next block {}",
                safe_head, self.next_block
            );
            return Ok(false);
        }

        let span = self.config.max_block_range.max(1);
        let to = safe_head.min(self.next_block.saturating_add(span - 1));
        let mut logs = self.fetcher.fetch_logs(self.next_block, to).await?;
        logs.sort_by_key(LogPosition::of);

        for log in logs {
            self.admit(log);
        }

        let checkpoint = LogPosition::end_of_block(to);
        self.cursor = Some(checkpoint);
        self.pending.push_back(SourceItem::Checkpoint(checkpoint));
        self.next_block = to + 1;
        Ok(true)
    }

    fn admit(&mut self, log: Log) {
        if log.removed {
            warn!(
                "Dropping log removed by reorg at {:?}",
                LogPosition::of(&log)
            );
            return;
        }
        if let Some(position) = LogPosition::of(&log) {
            if self.cursor.is_some_and(|cursor| position <= cursor) {
                debug!("Dropping redelivered log at {}", position);
                return;
            }
            self.cursor = Some(position);
        }
        match decode_observed(&log) {
            Ok(observed) => {
                debug!(
                    "Observed teleport of asset {} at {}",
                    observed.event.source_asset_id, observed.position
                );
                self.pending.push_back(SourceItem::Event(observed));
            }
            Err(err) => {
                error!(
                    "Dropping undecodable log in tx {:?}: {}",
                    log.transaction_hash, err
                );
            }
        }
    }
}
