//! The batch-submission driver: a periodic loop that ingests L2 blocks
//! into the channel manager and drains ready channel data into L1
//! transactions, plus the start/stop lifecycle around it.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    channels::{ChannelManager, CloseOutcome, TxData},
    common::{BlockId, BlockInfo},
    config::Config,
    driver::SubmitterError,
    plasma::PlasmaClient,
    rollup::{EndpointProvider, L1Client},
    telemetry::metrics,
    transactions::{TxManager, TxQueue, TxReceipt},
};

/// The handles of a running driver loop.
struct RunningState {
    /// Cancelled first on stop; ends ingestion and begins the final drain
    shutdown: CancellationToken,
    /// Outer bound on all outbound work; parent of the shutdown scope
    kill: CancellationToken,
    /// The driver loop task
    worker: JoinHandle<()>,
    /// The receipt fan-in task
    fan_in: JoinHandle<()>,
}

/// BatchSubmitter owns the batch-submission service lifecycle: it starts
/// and stops the driver loop and the receipt fan-in, rebuilding the
/// cancellation scopes and the submission queue on every start.
pub struct BatchSubmitter<C, T> {
    cfg: Config,
    state: Arc<C>,
    tx_mgr: Arc<T>,
    endpoints: Arc<dyn EndpointProvider>,
    l1_client: Arc<dyn L1Client>,
    plasma: Option<Arc<dyn PlasmaClient>>,
    running: Mutex<Option<RunningState>>,
}

impl<C, T> std::fmt::Debug for BatchSubmitter<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSubmitter")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl<C, T> BatchSubmitter<C, T>
where
    C: ChannelManager,
    T: TxManager,
{
    /// Constructs a new BatchSubmitter over the given collaborators
    pub fn new(
        cfg: Config,
        state: Arc<C>,
        endpoints: Arc<dyn EndpointProvider>,
        l1_client: Arc<dyn L1Client>,
        tx_mgr: Arc<T>,
    ) -> Self {
        Self {
            cfg,
            state,
            tx_mgr,
            endpoints,
            l1_client,
            plasma: None,
            running: Mutex::new(None),
        }
    }

    /// Sets the alt-DA client used when plasma mode is enabled.
    ///
    /// Returns the [BatchSubmitter] instance.
    pub fn with_plasma(mut self, plasma: Arc<dyn PlasmaClient>) -> Self {
        self.plasma = Some(plasma);
        self
    }

    /// Starts the driver loop and the receipt fan-in.
    ///
    /// Fails with [SubmitterError::AlreadyRunning] if the loop is already
    /// up, and with [SubmitterError::InvalidConfig] if the mode flags
    /// disagree with the wired collaborators.
    pub async fn start(&self) -> Result<(), SubmitterError> {
        tracing::info!("starting batch submitter");
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SubmitterError::AlreadyRunning);
        }
        if self.cfg.use_blobs && self.cfg.use_plasma {
            return Err(SubmitterError::InvalidConfig(
                "blob and plasma modes are mutually exclusive".to_string(),
            ));
        }
        if self.cfg.use_plasma && self.plasma.is_none() {
            return Err(SubmitterError::InvalidConfig(
                "plasma mode requires a DA client".to_string(),
            ));
        }

        let kill = CancellationToken::new();
        let shutdown = kill.child_token();

        let (receipts_tx, receipts_rx) = mpsc::channel(self.cfg.max_pending_transactions.max(1));
        let queue = TxQueue::new(
            kill.clone(),
            self.tx_mgr.clone(),
            self.cfg.max_pending_transactions,
        );
        let fan_in = tokio::spawn(process_receipts(self.state.clone(), receipts_rx));

        let driver = BatchDriver {
            cfg: self.cfg.clone(),
            state: self.state.clone(),
            tx_mgr: self.tx_mgr.clone(),
            endpoints: self.endpoints.clone(),
            l1_client: self.l1_client.clone(),
            plasma: self.plasma.clone(),
            last_stored_block: None,
            last_l1_tip: BlockInfo::default(),
            shutdown: shutdown.clone(),
            kill: kill.clone(),
        };
        let worker = tokio::spawn(driver.run(queue, receipts_tx));

        *running = Some(RunningState {
            shutdown,
            kill,
            worker,
            fan_in,
        });
        tracing::info!("batch submitter started");
        Ok(())
    }

    /// Stops the driver loop, blocking until it has drained and joined.
    ///
    /// Cancelling `ctx` fires the kill scope early, aborting outstanding
    /// sends instead of waiting for them. Fails with
    /// [SubmitterError::NotRunning] if the loop is not up.
    pub async fn stop(&self, ctx: CancellationToken) -> Result<(), SubmitterError> {
        tracing::info!("stopping batch submitter");
        let mut running = self.running.lock().await;
        let Some(run) = running.take() else {
            return Err(SubmitterError::NotRunning);
        };

        // fire the kill scope as soon as the caller gives up waiting
        let kill = run.kill.clone();
        let hard_kill = tokio::spawn(async move {
            ctx.cancelled().await;
            kill.cancel();
        });

        run.shutdown.cancel();
        if run.worker.await.is_err() {
            tracing::error!("driver loop panicked");
        }
        run.kill.cancel();
        hard_kill.abort();
        if run.fan_in.await.is_err() {
            tracing::error!("receipt fan-in panicked");
        }
        tracing::info!("batch submitter stopped");
        Ok(())
    }

    /// [Self::stop], except that stopping an already-stopped submitter is
    /// not an error.
    pub async fn stop_if_running(&self, ctx: CancellationToken) -> Result<(), SubmitterError> {
        match self.stop(ctx).await {
            Err(SubmitterError::NotRunning) => Ok(()),
            result => result,
        }
    }
}

/// Why the inner publish protocol stopped.
#[derive(Debug)]
pub(crate) enum PublishError {
    /// The channel manager has nothing ready; done for now
    NoData,
    /// The kill scope fired while staging a send
    Cancelled,
    /// An RPC or rendering failure; logged by the caller
    Other(eyre::Report),
}

/// BatchDriver is the driver loop itself: one value owned by the loop
/// task, holding the collaborators and the ingestion bookmarks.
pub struct BatchDriver<C, T> {
    pub(crate) cfg: Config,
    pub(crate) state: Arc<C>,
    pub(crate) tx_mgr: Arc<T>,
    pub(crate) endpoints: Arc<dyn EndpointProvider>,
    pub(crate) l1_client: Arc<dyn L1Client>,
    pub(crate) plasma: Option<Arc<dyn PlasmaClient>>,
    /// The highest L2 block loaded into the channel manager. `None` until
    /// the first tick and again after a reorg.
    pub(crate) last_stored_block: Option<BlockId>,
    /// The most recently observed L1 tip
    pub(crate) last_l1_tip: BlockInfo,
    pub(crate) shutdown: CancellationToken,
    pub(crate) kill: CancellationToken,
}

impl<C, T> std::fmt::Debug for BatchDriver<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDriver")
            .field("last_stored_block", &self.last_stored_block)
            .field("last_l1_tip", &self.last_l1_tip)
            .finish_non_exhaustive()
    }
}

impl<C, T> BatchDriver<C, T>
where
    C: ChannelManager,
    T: TxManager,
{
    /// Runs the driver loop until the shutdown scope fires.
    pub async fn run(
        mut self,
        queue: TxQueue<TxData, T>,
        receipts_tx: mpsc::Sender<TxReceipt<TxData>>,
    ) {
        let shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.load_blocks_into_state().await {
                        Err(super::ranges::IngestError::Reorg) => {
                            if let CloseOutcome::PendingData = self.state.close() {
                                tracing::warn!("closed channel manager with pending channel data");
                            }
                            self.publish_and_wait(&queue, &receipts_tx).await;
                            self.state.clear();
                            continue;
                        }
                        // transient failures were logged where they happened;
                        // drain whatever is already ready
                        Ok(()) | Err(super::ranges::IngestError::Rpc) => {}
                    }
                    self.publish_state_to_l1(&queue, &receipts_tx).await;
                }
                _ = shutdown.cancelled() => {
                    if self.tx_mgr.is_closed() {
                        tracing::info!("transaction manager is closed, no further transactions can be sent");
                        return;
                    }
                    if let CloseOutcome::PendingData = self.state.close() {
                        tracing::warn!("closed channel manager with pending channel data");
                    }
                    self.publish_and_wait(&queue, &receipts_tx).await;
                    tracing::info!("finished publishing all remaining channel data");
                    return;
                }
            }
        }
    }

    /// Drains all ready channel data into the queue, then blocks until no
    /// send is in flight. The wait is skipped when the transaction
    /// manager is closed: nothing would drain the queue.
    pub(crate) async fn publish_and_wait(
        &mut self,
        queue: &TxQueue<TxData, T>,
        receipts_tx: &mpsc::Sender<TxReceipt<TxData>>,
    ) {
        self.publish_state_to_l1(queue, receipts_tx).await;
        if !self.tx_mgr.is_closed() {
            queue.wait().await;
        } else {
            tracing::info!("transaction manager is closed, remaining channel data won't be sent");
        }
    }

    /// Drains ready channel data into the queue until the manager reports
    /// nothing ready, the transaction manager closes, or an error stops
    /// the round.
    pub(crate) async fn publish_state_to_l1(
        &mut self,
        queue: &TxQueue<TxData, T>,
        receipts_tx: &mpsc::Sender<TxReceipt<TxData>>,
    ) {
        loop {
            if self.tx_mgr.is_closed() {
                tracing::info!("transaction manager is closed, aborting state publishing");
                return;
            }
            match self.publish_tx_to_l1(queue, receipts_tx).await {
                Ok(()) => {}
                Err(PublishError::NoData) => {
                    tracing::trace!("no transaction data available");
                    return;
                }
                Err(PublishError::Cancelled) => {
                    tracing::warn!("kill scope fired while staging a transaction");
                    return;
                }
                Err(PublishError::Other(err)) => {
                    tracing::error!("error publishing transaction to L1: {:#}", err);
                    return;
                }
            }
        }
    }

    /// Stages a single unit of channel data as an L1 transaction.
    async fn publish_tx_to_l1(
        &mut self,
        queue: &TxQueue<TxData, T>,
        receipts_tx: &mpsc::Sender<TxReceipt<TxData>>,
    ) -> Result<(), PublishError> {
        let tip = self.l1_tip().await.map_err(PublishError::Other)?;
        self.record_l1_tip(tip);

        let txdata = match self.state.tx_data(tip.id()) {
            Ok(Some(data)) => data,
            Ok(None) => return Err(PublishError::NoData),
            Err(err) => {
                return Err(PublishError::Other(err.wrap_err("getting next channel data")))
            }
        };

        self.stage_transaction(txdata, queue, receipts_tx).await
    }

    /// Fetches the current L1 tip, bounded by the network timeout and the
    /// kill scope so the post-shutdown drain can still reach L1.
    async fn l1_tip(&self) -> Result<BlockInfo> {
        let client = self.l1_client.clone();
        let kill = self.kill.clone();
        self.bounded(&kill, async move { client.latest_header().await })
            .await
            .wrap_err("getting latest L1 block")
    }

    /// Updates the tip bookmark, emitting the metric only on change.
    pub(crate) fn record_l1_tip(&mut self, tip: BlockInfo) {
        if self.last_l1_tip == tip {
            return;
        }
        self.last_l1_tip = tip;
        tracing::debug!(number = tip.number, "observed new L1 tip");
        metrics::LATEST_L1_BLOCK.set(tip.number as i64);
    }

    /// Races a network request against its timeout and the given
    /// cancellation scope.
    pub(crate) async fn bounded<V>(
        &self,
        scope: &CancellationToken,
        fut: impl std::future::Future<Output = Result<V>>,
    ) -> Result<V> {
        tokio::select! {
            _ = scope.cancelled() => eyre::bail!("cancelled while waiting on a network request"),
            result = tokio::time::timeout(self.cfg.network_timeout, fut) => {
                result.map_err(|_| eyre::eyre!("network request timed out"))?
            }
        }
    }
}

/// Consumes transaction receipts and reports each outcome to the channel
/// manager. Runs until the receipts channel closes behind the loop.
async fn process_receipts<C: ChannelManager>(
    state: Arc<C>,
    mut receipts: mpsc::Receiver<TxReceipt<TxData>>,
) {
    while let Some(receipt) = receipts.recv().await {
        let id = receipt.id.id();
        match receipt.result {
            Ok(confirmation) => {
                tracing::info!(id = %id, tx = %confirmation.tx_hash, "transaction confirmed");
                state.tx_confirmed(&id, confirmation.block);
            }
            Err(err) => {
                tracing::warn!(id = %id, "transaction failed to send: {:#}", err);
                state.tx_failed(&id);
            }
        }
    }
}
