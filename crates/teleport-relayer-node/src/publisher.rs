//! Root publishing: bounded-retry submission to the destination ledger and the worker driving it.

use std::{sync::Arc, time::Duration};

use alloy::primitives::B256;
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use teleport_commitment::InclusionProof;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::{
    app::Commitment,
    status::StatusBoard,
    store::{AppStore, StoreError},
};

/// A root known to be the destination ledger's current commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRoot {
    pub root: B256,
    /// Destination block number the update was confirmed (or observed) at
    pub published_at: u64,
    /// Hash of the update transaction, absent when adopted from the destination state
    pub tx_ref: Option<String>,
}

/// Destination contract root as read at a given block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationRoot {
    pub root: B256,
    pub block_number: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Failed to submit root update: {0}")]
    Submission(String),
    #[error("Root update transaction {0} reverted")]
    Reverted(String),
    #[error("Failed to confirm root update: {0}")]
    Confirmation(String),
    #[error("Publish attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to query destination: {0}")]
    Query(String),
    #[error("Destination rejected proof of leaf {leaf} under root {root}")]
    EncodingMismatch { leaf: B256, root: B256 },
}

/// Write and read access to the destination verifier contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RootSubmitter: Send + Sync {
    /// Send a root update and wait until it is confirmed
    async fn submit_root(&self, root: B256) -> Result<PublishedRoot, PublishError>;

    /// Current root of the destination contract
    async fn current_root(&self) -> Result<DestinationRoot, PublishError>;

    /// Evaluate the destination's own proof check against its current root
    async fn verify_leaf(&self, leaf: B256, proof: Vec<B256>) -> Result<bool, PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// This instance already submitted the root
    AlreadySubmitted,
    /// The destination already holds the root
    MatchesDestination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Submitted(PublishedRoot),
    Skipped(SkipReason),
    Failed(PublishError),
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum number of submission attempts per root
    pub max_attempts: u32,
    /// Timeout of a single attempt, including confirmation
    pub attempt_timeout: Duration,
    /// Delay before the second attempt
    pub initial_retry_interval: Duration,
    /// Upper bound of the delay between attempts
    pub max_retry_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(120),
            initial_retry_interval: Duration::from_secs(2),
            max_retry_interval: Duration::from_secs(60),
        }
    }
}

/// Publishes roots, skipping ones already submitted
pub struct Publisher<S> {
    submitter: S,
    store: Arc<AppStore>,
    config: PublisherConfig,
    last_submitted: Option<PublishedRoot>,
}

impl<S: RootSubmitter> Publisher<S> {
    /// Create a publisher resuming from the last published root in the store
    pub async fn restore(
        submitter: S,
        store: Arc<AppStore>,
        config: PublisherConfig,
    ) -> Result<Self, StoreError> {
        let last_submitted = store.get_last_published().await?;
        if let Some(last) = &last_submitted {
            info!(
                "Last published root {} at destination block {}",
                last.root, last.published_at
            );
        }
        Ok(Self {
            submitter,
            store,
            config,
            last_submitted,
        })
    }

    pub fn last_submitted(&self) -> Option<&PublishedRoot> {
        self.last_submitted.as_ref()
    }

    /// Resolve a root left pending by an interrupted submission.
    /// Returns the root if the destination holds it and it was adopted as published.
    pub async fn reconcile(&mut self) -> Result<Option<PublishedRoot>, StoreError> {
        let Some(pending) = self.store.get_pending_root().await? else {
            return Ok(None);
        };
        match self.destination_root().await {
            Ok(destination) if destination.root == pending => {
                info!("Pending root {} is on the destination, adopting it", pending);
                self.adopt(destination).await.map(Some)
            }
            Ok(destination) => {
                info!(
                    "Pending root {} never landed (destination holds {}), discarding",
                    pending, destination.root
                );
                self.store.clear_pending_root().await?;
                Ok(None)
            }
            Err(err) => {
                warn!(
                    "Failed to reconcile pending root {}, it will be resubmitted: {}",
                    pending, err
                );
                Ok(None)
            }
        }
    }

    /// Publish `root`, retrying failed attempts with exponential backoff up to `max_attempts`
    pub async fn publish(&mut self, root: B256) -> Result<PublishOutcome, StoreError> {
        if self
            .last_submitted
            .as_ref()
            .is_some_and(|last| last.root == root)
        {
            debug!("Root {} already submitted, skipping", root);
            return Ok(PublishOutcome::Skipped(SkipReason::AlreadySubmitted));
        }

        self.store.set_pending_root(&root).await?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_retry_interval,
            max_interval: self.config.max_retry_interval,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.submitter.submit_root(root),
            )
            .await
            {
                Ok(Ok(published)) => {
                    self.store.record_published(&published).await?;
                    info!(
                        "Root {} published at destination block {} (tx {})",
                        published.root,
                        published.published_at,
                        published.tx_ref.as_deref().unwrap_or("-")
                    );
                    self.last_submitted = Some(published.clone());
                    return Ok(PublishOutcome::Submitted(published));
                }
                Ok(Err(err)) => err,
                Err(_) => PublishError::Timeout(self.config.attempt_timeout),
            };
            warn!(
                "Publish attempt {}/{} for root {} failed: {}",
                attempt, max_attempts, root, err
            );

            // The update may have landed even though we did not see it confirmed
            match self.destination_root().await {
                Ok(destination) if destination.root == root => {
                    info!("Destination already holds root {}", root);
                    self.adopt(destination).await?;
                    return Ok(PublishOutcome::Skipped(SkipReason::MatchesDestination));
                }
                Ok(_) => {}
                Err(query_err) => debug!("Failed to read destination root: {}", query_err),
            }

            if attempt >= max_attempts {
                return Ok(PublishOutcome::Failed(err));
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.config.max_retry_interval);
            tokio::time::sleep(delay).await;
        }
    }

    /// Check that the destination accepts a proof produced by our encoding
    pub async fn check_encoding(&self, proof: &InclusionProof) -> Result<(), PublishError> {
        let accepted = tokio::time::timeout(
            self.config.attempt_timeout,
            self.submitter.verify_leaf(proof.leaf, proof.proof.clone()),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.config.attempt_timeout))??;
        if accepted {
            Ok(())
        } else {
            Err(PublishError::EncodingMismatch {
                leaf: proof.leaf,
                root: proof.root,
            })
        }
    }

    async fn destination_root(&self) -> Result<DestinationRoot, PublishError> {
        tokio::time::timeout(self.config.attempt_timeout, self.submitter.current_root())
            .await
            .map_err(|_| PublishError::Timeout(self.config.attempt_timeout))?
    }

    async fn adopt(&mut self, destination: DestinationRoot) -> Result<PublishedRoot, StoreError> {
        let published = PublishedRoot {
            root: destination.root,
            published_at: destination.block_number,
            tx_ref: None,
        };
        self.store.record_published(&published).await?;
        self.last_submitted = Some(published.clone());
        Ok(published)
    }
}

#[derive(Debug, Clone)]
pub struct PublishWorkerConfig {
    /// How long publishing stays suspended after exhausting attempts
    pub degraded_cooldown: Duration,
}

/// What the worker does after handling a commitment
enum Flow {
    Done,
    Retry,
    Shutdown,
}

/// Single task publishing the newest commitment root
pub struct PublishWorker<S> {
    publisher: Publisher<S>,
    config: PublishWorkerConfig,
    rx_commitment: watch::Receiver<Commitment>,
    status: StatusBoard,
    rx_shutdown: broadcast::Receiver<()>,
}

impl<S: RootSubmitter> PublishWorker<S> {
    pub fn new(
        publisher: Publisher<S>,
        config: PublishWorkerConfig,
        rx_commitment: watch::Receiver<Commitment>,
        status: StatusBoard,
        rx_shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            publisher,
            config,
            rx_commitment,
            status,
            rx_shutdown,
        }
    }

    async fn run_inner(&mut self) -> Result<(), anyhow::Error> {
        info!("Publish worker started");

        self.publisher.reconcile().await?;
        let last_published = self.publisher.last_submitted().cloned();
        self.status
            .update(|status| status.last_published = last_published);

        loop {
            // Only the newest commitment matters: intermediate roots are coalesced
            let commitment = self.rx_commitment.borrow_and_update().clone();
            let flow = match commitment.root() {
                Some(root) => self.publish(root, &commitment).await?,
                None => Flow::Done,
            };
            match flow {
                Flow::Done => {}
                Flow::Retry => continue,
                Flow::Shutdown => return Ok(()),
            }

            tokio::select! {
                res = self.rx_commitment.changed() => {
                    if res.is_err() {
                        return Ok(())
                    }
                },
                _ = self.rx_shutdown.recv() => {
                    return Ok(())
                }
            }
        }
    }

    async fn publish(&mut self, root: B256, commitment: &Commitment) -> Result<Flow, anyhow::Error> {
        self.status.set_publishing(true);
        let outcome = tokio::select! {
            outcome = self.publisher.publish(root) => outcome,
            _ = self.rx_shutdown.recv() => {
                warn!("Shutdown while publishing root {}, pending root kept for reconciliation", root);
                self.status.set_publishing(false);
                return Ok(Flow::Shutdown);
            }
        };
        self.status.set_publishing(false);

        match outcome? {
            PublishOutcome::Submitted(published) => {
                self.status
                    .update(|status| status.last_published = Some(published));
                let Some(proof) = commitment.newest_proof() else {
                    return Ok(Flow::Done);
                };
                match self.publisher.check_encoding(&proof).await {
                    Ok(()) => {
                        debug!(
                            "Destination accepts proof of asset {}",
                            proof.event.source_asset_id
                        );
                        Ok(Flow::Done)
                    }
                    Err(err @ PublishError::EncodingMismatch { .. }) => {
                        error!("{}, halting publishing", err);
                        self.status.halt(err.to_string());
                        let _ = self.rx_shutdown.recv().await;
                        Ok(Flow::Shutdown)
                    }
                    Err(err) => {
                        warn!("Failed to check proof encoding on destination: {}", err);
                        Ok(Flow::Done)
                    }
                }
            }
            PublishOutcome::Skipped(reason) => {
                debug!("Publishing root {} skipped: {:?}", root, reason);
                if reason == SkipReason::MatchesDestination {
                    let last_published = self.publisher.last_submitted().cloned();
                    self.status
                        .update(|status| status.last_published = last_published);
                }
                Ok(Flow::Done)
            }
            PublishOutcome::Failed(err) => {
                error!(
                    "Publishing root {} failed after {} attempts, suspending publishing: {}",
                    root,
                    self.publisher.config.max_attempts.max(1),
                    err
                );
                self.status.degrade(err.to_string());
                tokio::select! {
                    _ = tokio::time::sleep(self.config.degraded_cooldown) => {
                        info!("Degraded cooldown expired, resuming publishing");
                    },
                    _ = self.status.retry_requested() => {
                        info!("Publish retry requested by operator");
                    },
                    _ = self.rx_shutdown.recv() => {
                        return Ok(Flow::Shutdown);
                    }
                }
                self.status.recover();
                Ok(Flow::Retry)
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), ()> {
        match self.run_inner().await {
            Err(err) => {
                error!("Publish worker exited: {}", err);
                Err(())
            }
            Ok(()) => {
                info!("Publish worker terminated");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RelayerState;
    use alloy::primitives::{Address, U256};
    use mockall::predicate::eq;
    use teleport_commitment::{CommitmentLog, MigrationEvent};
    use tempfile::TempDir;

    fn fast_config(max_attempts: u32) -> PublisherConfig {
        PublisherConfig {
            max_attempts,
            attempt_timeout: Duration::from_millis(200),
            initial_retry_interval: Duration::from_millis(1),
            max_retry_interval: Duration::from_millis(2),
        }
    }

    async fn temp_store() -> (TempDir, Arc<AppStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = AppStore::single_atomic_writer(dir.path().join("relayer.db"))
            .await
            .unwrap();
        (dir, Arc::new(store))
    }

    fn published(root: B256, block_number: u64) -> PublishedRoot {
        PublishedRoot {
            root,
            published_at: block_number,
            tx_ref: Some(format!("0x{block_number:064x}")),
        }
    }

    fn commitment(count: u64) -> Commitment {
        let mut log = CommitmentLog::new();
        for id in 1..=count {
            log.append(MigrationEvent::new(
                U256::from(id),
                Address::repeat_byte(id as u8),
                U256::from(0u64),
                format!("Qm{id}"),
            ));
        }
        Commitment::build(log.snapshot())
    }

    #[tokio::test]
    async fn test_publish_then_skip_same_root() {
        let (_dir, store) = temp_store().await;
        let root = B256::repeat_byte(0xab);

        let mut submitter = MockRootSubmitter::new();
        submitter
            .expect_submit_root()
            .with(eq(root))
            .times(1)
            .returning(move |root| Ok(published(root, 10)));

        let mut publisher = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();
        assert_eq!(
            publisher.publish(root).await.unwrap(),
            PublishOutcome::Submitted(published(root, 10))
        );
        assert_eq!(
            publisher.publish(root).await.unwrap(),
            PublishOutcome::Skipped(SkipReason::AlreadySubmitted)
        );
        assert_eq!(store.get_pending_root().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restart_does_not_resubmit() {
        let (_dir, store) = temp_store().await;
        let root = B256::repeat_byte(0x01);

        let mut submitter = MockRootSubmitter::new();
        submitter
            .expect_submit_root()
            .times(1)
            .returning(move |root| Ok(published(root, 7)));
        let mut publisher = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();
        publisher.publish(root).await.unwrap();

        // A fresh instance over the same store must not submit again
        let mut submitter = MockRootSubmitter::new();
        submitter.expect_submit_root().never();
        let mut restarted = Publisher::restore(submitter, store, fast_config(3))
            .await
            .unwrap();
        assert_eq!(
            restarted.publish(root).await.unwrap(),
            PublishOutcome::Skipped(SkipReason::AlreadySubmitted)
        );
    }

    #[tokio::test]
    async fn test_failed_attempt_matching_destination_is_skipped() {
        let (_dir, store) = temp_store().await;
        let root = B256::repeat_byte(0x02);

        let mut submitter = MockRootSubmitter::new();
        submitter
            .expect_submit_root()
            .times(1)
            .returning(|_| Err(PublishError::Confirmation("receipt not found".to_string())));
        submitter.expect_current_root().times(1).returning(move || {
            Ok(DestinationRoot {
                root,
                block_number: 55,
            })
        });

        let mut publisher = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();
        assert_eq!(
            publisher.publish(root).await.unwrap(),
            PublishOutcome::Skipped(SkipReason::MatchesDestination)
        );
        let last = store.get_last_published().await.unwrap().unwrap();
        assert_eq!(last.root, root);
        assert_eq!(last.published_at, 55);
        assert_eq!(last.tx_ref, None);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail_and_keep_pending_root() {
        let (_dir, store) = temp_store().await;
        let root = B256::repeat_byte(0x03);

        let mut submitter = MockRootSubmitter::new();
        submitter
            .expect_submit_root()
            .times(3)
            .returning(|_| Err(PublishError::Submission("nonce too low".to_string())));
        submitter
            .expect_current_root()
            .times(3)
            .returning(|| Err(PublishError::Query("connection refused".to_string())));

        let mut publisher = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();
        assert_eq!(
            publisher.publish(root).await.unwrap(),
            PublishOutcome::Failed(PublishError::Submission("nonce too low".to_string()))
        );
        assert_eq!(store.get_pending_root().await.unwrap(), Some(root));
        assert!(store.get_last_published().await.unwrap().is_none());
    }

    /// Submitter that never confirms within the attempt timeout
    struct StalledSubmitter;

    #[async_trait]
    impl RootSubmitter for StalledSubmitter {
        async fn submit_root(&self, _root: B256) -> Result<PublishedRoot, PublishError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(PublishError::Confirmation("unreachable".to_string()))
        }

        async fn current_root(&self) -> Result<DestinationRoot, PublishError> {
            Ok(DestinationRoot {
                root: B256::ZERO,
                block_number: 1,
            })
        }

        async fn verify_leaf(&self, _leaf: B256, _proof: Vec<B256>) -> Result<bool, PublishError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let (_dir, store) = temp_store().await;
        let mut config = fast_config(2);
        config.attempt_timeout = Duration::from_millis(20);

        let mut publisher = Publisher::restore(StalledSubmitter, store, config)
            .await
            .unwrap();
        assert_eq!(
            publisher.publish(B256::repeat_byte(0x04)).await.unwrap(),
            PublishOutcome::Failed(PublishError::Timeout(Duration::from_millis(20)))
        );
    }

    #[tokio::test]
    async fn test_reconcile_adopts_or_discards_pending_root() {
        let (_dir, store) = temp_store().await;
        let landed = B256::repeat_byte(0x05);
        let lost = B256::repeat_byte(0x06);

        store.set_pending_root(&landed).await.unwrap();
        let mut submitter = MockRootSubmitter::new();
        submitter.expect_current_root().returning(move || {
            Ok(DestinationRoot {
                root: landed,
                block_number: 90,
            })
        });
        submitter.expect_submit_root().never();
        let mut publisher = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();

        let adopted = publisher.reconcile().await.unwrap().unwrap();
        assert_eq!(adopted.root, landed);
        assert_eq!(store.get_pending_root().await.unwrap(), None);
        assert_eq!(
            publisher.publish(landed).await.unwrap(),
            PublishOutcome::Skipped(SkipReason::AlreadySubmitted)
        );

        store.set_pending_root(&lost).await.unwrap();
        assert_eq!(publisher.reconcile().await.unwrap(), None);
        assert_eq!(store.get_pending_root().await.unwrap(), None);
        assert_eq!(publisher.last_submitted().map(|p| p.root), Some(landed));
    }

    #[tokio::test]
    async fn test_check_encoding() {
        let (_dir, store) = temp_store().await;
        let proof = commitment(3).newest_proof().unwrap();

        let mut submitter = MockRootSubmitter::new();
        let mut calls = 0;
        submitter
            .expect_verify_leaf()
            .with(eq(proof.leaf), eq(proof.proof.clone()))
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                Ok(calls == 1)
            });
        let publisher = Publisher::restore(submitter, store, fast_config(1))
            .await
            .unwrap();

        assert_eq!(publisher.check_encoding(&proof).await, Ok(()));
        assert_eq!(
            publisher.check_encoding(&proof).await,
            Err(PublishError::EncodingMismatch {
                leaf: proof.leaf,
                root: proof.root
            })
        );
    }

    async fn spawn_worker<S: RootSubmitter + 'static>(
        submitter: S,
        store: Arc<AppStore>,
        status: StatusBoard,
        config: PublisherConfig,
        degraded_cooldown: Duration,
    ) -> (
        watch::Sender<Commitment>,
        broadcast::Sender<()>,
        tokio::task::JoinHandle<Result<(), ()>>,
    ) {
        let publisher = Publisher::restore(submitter, store, config)
            .await
            .unwrap();
        let (tx_commitment, rx_commitment) = watch::channel(Commitment::default());
        let (tx_shutdown, rx_shutdown) = broadcast::channel(1);
        let mut worker = PublishWorker::new(
            publisher,
            PublishWorkerConfig { degraded_cooldown },
            rx_commitment,
            status,
            rx_shutdown,
        );
        let handle = tokio::spawn(async move { worker.run().await });
        (tx_commitment, tx_shutdown, handle)
    }

    async fn wait_for_state(status: &StatusBoard, state: RelayerState) {
        let mut rx = status.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|current| current.state() == state),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_worker_degrades_and_recovers_on_operator_retry() {
        let (_dir, store) = temp_store().await;
        let status = StatusBoard::default();
        let target = commitment(2);
        let target_root = target.root().unwrap();

        let mut submitter = MockRootSubmitter::new();
        let mut calls = 0;
        submitter.expect_submit_root().returning(move |root| {
            calls += 1;
            if calls <= 2 {
                Err(PublishError::Submission("insufficient funds".to_string()))
            } else {
                Ok(published(root, 30))
            }
        });
        submitter
            .expect_current_root()
            .returning(|| Err(PublishError::Query("unavailable".to_string())));
        submitter.expect_verify_leaf().returning(|_, _| Ok(true));

        let (tx_commitment, tx_shutdown, handle) = spawn_worker(
            submitter,
            store.clone(),
            status.clone(),
            fast_config(2),
            Duration::from_secs(3600),
        )
        .await;
        tx_commitment.send(target).unwrap();

        wait_for_state(&status, RelayerState::Degraded).await;
        assert!(status.request_retry());
        let mut rx = status.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|current| {
                current.last_published.as_ref().map(|p| p.root) == Some(target_root)
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_ne!(status.state(), RelayerState::Degraded);

        tx_shutdown.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(
            store.get_last_published().await.unwrap().map(|p| p.root),
            Some(target_root)
        );
    }

    #[tokio::test]
    async fn test_worker_halts_on_encoding_mismatch() {
        let (_dir, store) = temp_store().await;
        let status = StatusBoard::default();

        let mut submitter = MockRootSubmitter::new();
        submitter
            .expect_submit_root()
            .times(1)
            .returning(|root| Ok(published(root, 12)));
        submitter.expect_verify_leaf().returning(|_, _| Ok(false));

        let (tx_commitment, tx_shutdown, handle) = spawn_worker(
            submitter,
            store,
            status.clone(),
            fast_config(2),
            Duration::from_millis(1),
        )
        .await;
        tx_commitment.send(commitment(3)).unwrap();
        wait_for_state(&status, RelayerState::Halted).await;

        // Newer roots are not published once halted
        tx_commitment.send(commitment(4)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(status.state(), RelayerState::Halted);

        tx_shutdown.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_shutdown_during_publish_keeps_pending_root() {
        let (_dir, store) = temp_store().await;
        let status = StatusBoard::default();
        let target = commitment(2);
        let target_root = target.root().unwrap();
        let mut config = fast_config(2);
        config.attempt_timeout = Duration::from_secs(3600);

        let (tx_commitment, tx_shutdown, handle) = spawn_worker(
            StalledSubmitter,
            store.clone(),
            status.clone(),
            config,
            Duration::from_secs(3600),
        )
        .await;
        tx_commitment.send(target).unwrap();
        wait_for_state(&status, RelayerState::Publishing).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get_pending_root().await.unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx_shutdown.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert_eq!(store.get_pending_root().await.unwrap(), Some(target_root));
        assert!(store.get_last_published().await.unwrap().is_none());

        // The interrupted submission landed after all
        let mut submitter = MockRootSubmitter::new();
        submitter.expect_current_root().times(1).returning(move || {
            Ok(DestinationRoot {
                root: target_root,
                block_number: 40,
            })
        });
        submitter.expect_submit_root().never();
        let mut restarted = Publisher::restore(submitter, store.clone(), fast_config(3))
            .await
            .unwrap();
        let adopted = restarted.reconcile().await.unwrap().unwrap();
        assert_eq!(adopted.root, target_root);
        assert_eq!(adopted.published_at, 40);
        assert_eq!(store.get_pending_root().await.unwrap(), None);
        assert_eq!(
            restarted.publish(target_root).await.unwrap(),
            PublishOutcome::Skipped(SkipReason::AlreadySubmitted)
        );
    }
}
