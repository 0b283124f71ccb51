use crate::chain::{BlockRef, ChainClient};
use crate::config::Config;
use crate::executor::BoundedExecutor;
use crate::reconciler::{BlockReport, TransactionReconciler};
use crate::repository::TransactionStore;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep};
use tracing::{debug, info, warn};

/// Lowest block the next sweep starts from. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    last_checking_block: u64,
}

impl ScanCursor {
    pub fn new(last_checking_block: u64) -> Self {
        Self {
            last_checking_block,
        }
    }

    /// Resumes a few blocks behind the newest stored transaction, or at
    /// `start_block` when nothing is stored yet.
    pub fn initialize(
        store: &dyn TransactionStore,
        start_block: u64,
        reorg_margin: u64,
    ) -> Result<Self> {
        let last_checking_block = match store.find_max_block_number()? {
            Some(max_block) => max_block.saturating_sub(reorg_margin),
            None => start_block,
        };
        Ok(Self::new(last_checking_block))
    }

    pub fn last_checking_block(&self) -> u64 {
        self.last_checking_block
    }

    /// Moves to `head - reorg_margin` unless that would go backwards.
    pub fn advance(&mut self, head: u64, reorg_margin: u64) -> bool {
        let target = head.saturating_sub(reorg_margin);
        if target > self.last_checking_block {
            self.last_checking_block = target;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub start_block: u64,
    pub reorg_margin: u64,
    pub sweep_interval: Duration,
    pub block_concurrency: usize,
    pub reconnect_interval: Duration,
    pub pending_recheck_limit: usize,
}

impl From<&Config> for WatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            start_block: config.start_block,
            reorg_margin: config.reorg_margin,
            sweep_interval: config.sweep_interval,
            block_concurrency: config.block_concurrency,
            reconnect_interval: config.reconnect_interval,
            pending_recheck_limit: config.pending_recheck_limit,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub from_block: u64,
    pub to_block: u64,
    pub blocks_processed: usize,
    pub blocks_failed: usize,
    pub transactions: BlockReport,
    pub pending_rechecked: BlockReport,
}

/// Feeds blocks to the reconciler from a live head subscription and a
/// periodic catch-up sweep.
pub struct ChainWatcher {
    client: Arc<dyn ChainClient>,
    reconciler: Arc<TransactionReconciler>,
    config: WatcherConfig,
    cursor: ScanCursor,
    executor: BoundedExecutor,
}

impl ChainWatcher {
    pub fn new(
        client: Arc<dyn ChainClient>,
        reconciler: Arc<TransactionReconciler>,
        config: WatcherConfig,
    ) -> Result<Self> {
        let cursor = ScanCursor::initialize(
            reconciler.transactions().as_ref(),
            config.start_block,
            config.reorg_margin,
        )?;
        info!(
            "Scan cursor initialized at block {}",
            cursor.last_checking_block()
        );

        Ok(Self {
            client,
            reconciler,
            executor: BoundedExecutor::new(config.block_concurrency),
            config,
            cursor,
        })
    }

    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    /// Processes `[last_checking_block, head]`, re-checks stored Pending
    /// records, then advances the cursor.
    pub async fn sweep(&mut self) -> Result<SweepReport> {
        let head = self.client.get_block_number().await?;
        let from_block = self.cursor.last_checking_block();

        let mut report = SweepReport {
            from_block,
            to_block: head,
            ..Default::default()
        };

        if from_block <= head {
            info!("Sweeping blocks {} to {}", from_block, head);

            let client = self.client.as_ref();
            let reconciler = self.reconciler.as_ref();
            let totals = Mutex::new(BlockReport::default());
            let totals_ref = &totals;

            let summary = self
                .executor
                .run(
                    from_block..=head,
                    |number| async move {
                        let block_report =
                            process_block(client, reconciler, BlockRef::Number(number)).await?;
                        totals_ref
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .merge(&block_report);
                        anyhow::Ok(())
                    },
                    |number, e| warn!("Failed to process block {}: {:#}", number, e),
                )
                .await;

            report.blocks_processed = summary.succeeded;
            report.blocks_failed = summary.failed;
            report.transactions = totals
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        } else {
            debug!(
                "Cursor {} is ahead of head {}, nothing to sweep",
                from_block, head
            );
        }

        match self
            .reconciler
            .reconcile_pending(self.config.pending_recheck_limit)
            .await
        {
            Ok(pending) => report.pending_rechecked = pending,
            Err(e) => warn!("Failed to re-check pending transactions: {:#}", e),
        }

        if self.cursor.advance(head, self.config.reorg_margin) {
            info!(
                "Advanced scan cursor to block {}",
                self.cursor.last_checking_block()
            );
        }

        Ok(report)
    }

    /// Spawns the sweep loop, plus the live path when the transport can
    /// push headers.
    pub fn start(self) -> WatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let live = if self.client.connection_type().supports_push() {
            Some(tokio::spawn(run_live(
                self.client.clone(),
                self.reconciler.clone(),
                self.config.reconnect_interval,
                shutdown_rx.clone(),
            )))
        } else {
            info!(
                "{} connection has no push support, relying on periodic sweeps",
                self.client.connection_type()
            );
            None
        };

        let sweep = tokio::spawn(self.run_sweeps(shutdown_rx));

        WatcherHandle {
            shutdown: shutdown_tx,
            sweep,
            live,
        }
    }

    async fn run_sweeps(mut self, mut shutdown: watch::Receiver<bool>) -> ScanCursor {
        let period = self.config.sweep_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) => info!(
                            "Sweep {}..{} done: {} block(s) ok, {} failed, {} confirmed, {} failed tx, {} pending",
                            report.from_block,
                            report.to_block,
                            report.blocks_processed,
                            report.blocks_failed,
                            report.transactions.confirmed + report.pending_rechecked.confirmed,
                            report.transactions.failed + report.pending_rechecked.failed,
                            report.pending_rechecked.pending,
                        ),
                        Err(e) => warn!("Sweep failed, retrying next tick: {:#}", e),
                    }
                }
            }
        }

        info!("Sweep loop stopped");
        self.cursor
    }
}

pub struct WatcherHandle {
    shutdown: watch::Sender<bool>,
    sweep: JoinHandle<ScanCursor>,
    live: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signals both paths to stop and waits for them. A sweep in progress
    /// runs to completion first.
    pub async fn stop(self) -> Result<ScanCursor> {
        self.shutdown.send(true).ok();

        if let Some(live) = self.live {
            live.await.context("Live ingestion task panicked")?;
        }
        self.sweep.await.context("Sweep task panicked")
    }
}

pub async fn process_block(
    client: &dyn ChainClient,
    reconciler: &TransactionReconciler,
    block_ref: BlockRef,
) -> Result<BlockReport> {
    let Some(block) = client.get_block(block_ref).await? else {
        anyhow::bail!("Block {} not available", block_ref);
    };
    reconciler.process_transactions_in_block(&block).await
}

async fn run_live(
    client: Arc<dyn ChainClient>,
    reconciler: Arc<TransactionReconciler>,
    reconnect_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match client.subscribe_new_heads().await {
            Ok(mut heads) => {
                info!("Subscribed to new block headers");
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        head = heads.next() => {
                            let Some(hash) = head else { break };
                            let processed =
                                process_block(client.as_ref(), &reconciler, BlockRef::Hash(hash))
                                    .await;
                            match processed {
                                Ok(report) => {
                                    debug!("Processed new block {:?}: {:?}", hash, report)
                                }
                                Err(e) => {
                                    warn!("Failed to process new block {:?}: {:#}", hash, e)
                                }
                            }
                        }
                    }
                }
                warn!("New block header subscription closed");
            }
            Err(e) => warn!("Failed to subscribe to new block headers: {:#}", e),
        }

        if !client.connection_type().supports_reconnect() {
            warn!(
                "{} connection cannot be re-established, live ingestion stopped",
                client.connection_type()
            );
            return;
        }

        if !reconnect_until_ready(client.as_ref(), reconnect_interval, &mut shutdown).await {
            return;
        }
    }
}

/// Retries forever at a fixed interval. Returns `false` only on shutdown.
async fn reconnect_until_ready(
    client: &dyn ChainClient,
    interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        tokio::select! {
            _ = shutdown.changed() => return false,
            _ = sleep(interval) => {}
        }

        match client.reconnect().await {
            Ok(()) => {
                info!("Reconnected after {} attempt(s)", attempt);
                return true;
            }
            Err(e) => warn!("Reconnect attempt {} failed: {:#}", attempt, e),
        }
    }
}
