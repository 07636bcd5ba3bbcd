//! Mock collaborators that return preset responses, used by the crate's
//! own tests and exported for downstream integration testing.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::{keccak256, Bytes, B256};
use async_trait::async_trait;
use eyre::Result;
use tokio::sync::watch;

use crate::{
    channels::{BlockUpdate, ChannelManager, CloseOutcome, TxData, TxId},
    common::{BlockId, BlockInfo, L2Block, RawTransaction, SyncStatus},
    config::Config,
    driver::{BatchDriver, BatchSubmitter},
    plasma::{Keccak256Commitment, PlasmaClient},
    rollup::{EndpointProvider, L1Client, L2Client, RollupNode},
    transactions::{Receipt, TxCandidate, TxManager},
};

/// Deterministic block hash for test chains. `salt` distinguishes forks.
pub fn block_hash(number: u64, salt: u8) -> B256 {
    let mut preimage = [0u8; 9];
    preimage[0] = salt;
    preimage[1..].copy_from_slice(&number.to_be_bytes());
    keccak256(preimage)
}

/// Header info for block `number` on the fork identified by `salt`.
pub fn block_info(number: u64, salt: u8) -> BlockInfo {
    BlockInfo {
        hash: block_hash(number, salt),
        number,
        parent_hash: block_hash(number.wrapping_sub(1), salt),
        timestamp: 1_700_000_000 + 2 * number,
    }
}

/// An L2 block with one raw transaction, chained per [block_info].
pub fn l2_block(number: u64, salt: u8) -> L2Block {
    L2Block {
        info: block_info(number, salt),
        transactions: vec![RawTransaction(vec![salt, number as u8])],
    }
}

/// A [SyncStatus] whose heads live on the fork identified by `salt`.
pub fn sync_status(safe: u64, unsafe_head: u64, salt: u8) -> SyncStatus {
    SyncStatus {
        head_l1: BlockInfo {
            hash: block_hash(unsafe_head, 0xee),
            number: unsafe_head,
            parent_hash: block_hash(unsafe_head - 1, 0xee),
            timestamp: 1_700_000_000 + 12 * unsafe_head,
        },
        safe_l2: block_info(safe, salt),
        unsafe_l2: block_info(unsafe_head, salt),
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Mock channel manager that records every call and emits scripted units.
#[derive(Debug, Default)]
pub struct MockChannelManager {
    inner: Mutex<ManagerState>,
}

#[derive(Debug, Default)]
struct ManagerState {
    reorg_at: Option<u64>,
    pending: VecDeque<TxData>,
    added: Vec<BlockId>,
    confirmed: Vec<(TxId, BlockId)>,
    failed: Vec<TxId>,
    closes: usize,
    clears: usize,
    close_outcome: Option<CloseOutcome>,
}

impl MockChannelManager {
    /// Constructs an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `add_l2_block` of block `number` report a reorg
    pub fn reorg_at(&self, number: u64) {
        self.inner.lock().unwrap().reorg_at = Some(number);
    }

    /// Queues a unit for `tx_data` to emit
    pub fn push_tx_data(&self, data: TxData) {
        self.inner.lock().unwrap().pending.push_back(data);
    }

    /// Sets the outcome reported by `close`
    pub fn close_with(&self, outcome: CloseOutcome) {
        self.inner.lock().unwrap().close_outcome = Some(outcome);
    }

    /// Ids of every block added, in order
    pub fn added(&self) -> Vec<BlockId> {
        self.inner.lock().unwrap().added.clone()
    }

    /// Every confirmed unit with its inclusion block, in arrival order
    pub fn confirmed(&self) -> Vec<(TxId, BlockId)> {
        self.inner.lock().unwrap().confirmed.clone()
    }

    /// Every failed unit, in arrival order
    pub fn failed(&self) -> Vec<TxId> {
        self.inner.lock().unwrap().failed.clone()
    }

    /// Number of `close` calls seen
    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    /// Number of `clear` calls seen
    pub fn clears(&self) -> usize {
        self.inner.lock().unwrap().clears
    }
}

impl ChannelManager for MockChannelManager {
    fn add_l2_block(&self, block: L2Block) -> BlockUpdate {
        let mut inner = self.inner.lock().unwrap();
        if inner.reorg_at == Some(block.info.number) {
            inner.reorg_at = None;
            return BlockUpdate::Reorg;
        }
        inner.added.push(block.id());
        BlockUpdate::Added
    }

    fn tx_data(&self, _l1_tip: BlockId) -> Result<Option<TxData>> {
        Ok(self.inner.lock().unwrap().pending.pop_front())
    }

    fn tx_confirmed(&self, id: &TxId, l1_block: BlockId) {
        self.inner
            .lock()
            .unwrap()
            .confirmed
            .push((id.clone(), l1_block));
    }

    fn tx_failed(&self, id: &TxId) {
        self.inner.lock().unwrap().failed.push(id.clone());
    }

    fn close(&self) -> CloseOutcome {
        let mut inner = self.inner.lock().unwrap();
        inner.closes += 1;
        inner.close_outcome.unwrap_or(CloseOutcome::Clean)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.clears += 1;
        inner.pending.clear();
    }
}

/// Mock transaction manager with controllable completion and outcome.
#[derive(Debug)]
pub struct MockTxManager {
    closed: AtomicBool,
    hold: AtomicBool,
    fail: AtomicBool,
    inclusion: Mutex<BlockId>,
    release: watch::Sender<bool>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    sent: Mutex<Vec<TxCandidate>>,
}

impl Default for MockTxManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTxManager {
    /// A manager whose sends succeed immediately
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            inclusion: Mutex::new(BlockId {
                hash: B256::repeat_byte(0x11),
                number: 1,
            }),
            release: watch::channel(false).0,
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Makes every send block until [Self::release] is called
    pub fn holding(self) -> Self {
        self.hold.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every send fail
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    /// Completes all held sends
    pub fn release(&self) {
        let _ = self.release.send(true);
    }

    /// Marks the manager closed
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Sets the inclusion block reported by successful sends
    pub fn include_in(&self, block: BlockId) {
        *self.inclusion.lock().unwrap() = block;
    }

    /// Every candidate handed to `send_tx`, in arrival order
    pub fn sent(&self) -> Vec<TxCandidate> {
        self.sent.lock().unwrap().clone()
    }

    /// The highest number of concurrent sends observed
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxManager for MockTxManager {
    async fn send_tx(&self, candidate: TxCandidate) -> Result<Receipt> {
        eprintln!("DBG mock send_tx entered");
        let concurrent = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(concurrent, Ordering::SeqCst);
        self.sent.lock().unwrap().push(candidate);

        if self.hold.load(Ordering::SeqCst) {
            let mut release = self.release.subscribe();
            eprintln!("DBG hold check, borrow={}", *release.borrow());
            while !*release.borrow() {
                eprintln!("DBG awaiting changed");
                if release.changed().await.is_err() {
                    break;
                }
                eprintln!("DBG changed fired, borrow={}", *release.borrow());
            }
            eprintln!("DBG hold released");
        }
        self.concurrent.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            eyre::bail!("transaction rejected");
        }
        Ok(Receipt {
            tx_hash: B256::repeat_byte(0xab),
            block: *self.inclusion.lock().unwrap(),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock rollup node reporting a settable [SyncStatus].
#[derive(Debug, Default)]
pub struct MockRollupNode {
    status: Mutex<Option<SyncStatus>>,
    polls: AtomicUsize,
}

impl MockRollupNode {
    /// Constructs a node with no status; queries fail until one is set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reported status
    pub fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap() = Some(status);
    }

    /// Number of `sync_status` queries seen
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RollupNode for MockRollupNode {
    async fn sync_status(&self) -> Result<SyncStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.status
            .lock()
            .unwrap()
            .ok_or_else(|| eyre::eyre!("sync status unavailable"))
    }
}

/// Mock L2 client serving inserted blocks by number.
#[derive(Debug, Default)]
pub struct MockL2Client {
    blocks: Mutex<HashMap<u64, L2Block>>,
    fetched: Mutex<Vec<u64>>,
}

impl MockL2Client {
    /// Constructs a client with no blocks
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a block
    pub fn push_block(&self, block: L2Block) {
        self.blocks.lock().unwrap().insert(block.info.number, block);
    }

    /// Every block number fetched, in order
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl L2Client for MockL2Client {
    async fn block_by_number(&self, number: u64) -> Result<L2Block> {
        self.fetched.lock().unwrap().push(number);
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| eyre::eyre!("block {number} not found"))
    }
}

/// Mock L1 client reporting a settable tip.
#[derive(Debug)]
pub struct MockL1Client {
    header: Mutex<BlockInfo>,
}

impl Default for MockL1Client {
    fn default() -> Self {
        Self::new()
    }
}

impl MockL1Client {
    /// Constructs a client at a fixed genesis-ish tip
    pub fn new() -> Self {
        Self {
            header: Mutex::new(BlockInfo {
                hash: block_hash(1, 0xee),
                number: 1,
                parent_hash: block_hash(0, 0xee),
                timestamp: 1_700_000_000,
            }),
        }
    }

    /// Sets the reported tip
    pub fn set_header(&self, header: BlockInfo) {
        *self.header.lock().unwrap() = header;
    }
}

#[async_trait]
impl L1Client for MockL1Client {
    async fn latest_header(&self) -> Result<BlockInfo> {
        Ok(*self.header.lock().unwrap())
    }
}

/// Mock endpoint provider handing out the wrapped mock clients.
#[derive(Debug)]
pub struct MockEndpointProvider {
    /// The rollup node handed out
    pub rollup: Arc<MockRollupNode>,
    /// The L2 client handed out
    pub l2: Arc<MockL2Client>,
}

#[async_trait]
impl EndpointProvider for MockEndpointProvider {
    async fn rollup_node(&self) -> Result<Arc<dyn RollupNode>> {
        Ok(self.rollup.clone())
    }

    async fn l2_client(&self) -> Result<Arc<dyn L2Client>> {
        Ok(self.l2.clone())
    }
}

/// Mock DA client that commits to inputs locally.
#[derive(Debug, Default)]
pub struct MockPlasmaClient {
    fail: AtomicBool,
    inputs: Mutex<Vec<Bytes>>,
}

impl MockPlasmaClient {
    /// Constructs a client whose uploads succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upload fail
    pub fn fail_uploads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every uploaded input, in order
    pub fn inputs(&self) -> Vec<Bytes> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlasmaClient for MockPlasmaClient {
    async fn set_input(&self, input: Bytes) -> Result<Keccak256Commitment> {
        if self.fail.load(Ordering::SeqCst) {
            eyre::bail!("DA store unavailable");
        }
        let commitment = Keccak256Commitment::from_input(&input);
        self.inputs.lock().unwrap().push(input);
        Ok(commitment)
    }
}

/// The full set of mock collaborators wired into a test driver.
#[derive(Debug)]
pub struct MockStack {
    /// The channel manager
    pub manager: Arc<MockChannelManager>,
    /// The transaction manager
    pub tx_mgr: Arc<MockTxManager>,
    /// The rollup node
    pub rollup: Arc<MockRollupNode>,
    /// The L2 client
    pub l2: Arc<MockL2Client>,
    /// The L1 client
    pub l1: Arc<MockL1Client>,
    /// The DA client
    pub plasma: Arc<MockPlasmaClient>,
}

impl Default for MockStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStack {
    /// Constructs a fresh set of mocks
    pub fn new() -> Self {
        Self {
            manager: Arc::new(MockChannelManager::new()),
            tx_mgr: Arc::new(MockTxManager::new()),
            rollup: Arc::new(MockRollupNode::new()),
            l2: Arc::new(MockL2Client::new()),
            l1: Arc::new(MockL1Client::new()),
            plasma: Arc::new(MockPlasmaClient::new()),
        }
    }

    /// Swaps in a different transaction manager
    pub fn with_tx_mgr(mut self, tx_mgr: MockTxManager) -> Self {
        self.tx_mgr = Arc::new(tx_mgr);
        self
    }

    fn endpoints(&self) -> Arc<MockEndpointProvider> {
        Arc::new(MockEndpointProvider {
            rollup: self.rollup.clone(),
            l2: self.l2.clone(),
        })
    }
}

/// A [BatchDriver] wired to a fresh [MockStack], for unit tests that
/// drive it directly.
pub fn test_driver(cfg: Config) -> (BatchDriver<MockChannelManager, MockTxManager>, MockStack) {
    use tokio_util::sync::CancellationToken;

    let mocks = MockStack::new();
    let kill = CancellationToken::new();
    let driver = BatchDriver {
        cfg,
        state: mocks.manager.clone(),
        tx_mgr: mocks.tx_mgr.clone(),
        endpoints: mocks.endpoints(),
        l1_client: mocks.l1.clone(),
        plasma: Some(mocks.plasma.clone()),
        last_stored_block: None,
        last_l1_tip: BlockInfo::default(),
        shutdown: kill.child_token(),
        kill,
    };
    (driver, mocks)
}

/// A [BatchSubmitter] wired to the given [MockStack], for scenario tests
/// that exercise the full lifecycle.
pub fn test_submitter(
    cfg: Config,
    mocks: &MockStack,
) -> BatchSubmitter<MockChannelManager, MockTxManager> {
    BatchSubmitter::new(
        cfg,
        mocks.manager.clone(),
        mocks.endpoints(),
        mocks.l1.clone(),
        mocks.tx_mgr.clone(),
    )
    .with_plasma(mocks.plasma.clone())
}
