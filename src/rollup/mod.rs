//! Client contracts for the rollup node, the L2 execution client, and the
//! L1 chain.
//!
//! RPC transport is out of scope; the driver consumes these traits and an
//! [EndpointProvider] that hands out the *current* client, so a failover
//! to a different sequencer endpoint only has to rebind the provider.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;

use crate::common::{BlockInfo, L2Block, SyncStatus};

/// ## RollupNode
///
/// The sequencer's rollup node, queried for chain progress.
#[async_trait]
pub trait RollupNode: Send + Sync + 'static {
    /// Returns the node's current [SyncStatus].
    async fn sync_status(&self) -> Result<SyncStatus>;
}

/// ## L2Client
///
/// The L2 execution client, queried for blocks to batch.
#[async_trait]
pub trait L2Client: Send + Sync + 'static {
    /// Fetches the L2 block with the given number, including its raw
    /// transactions.
    async fn block_by_number(&self, number: u64) -> Result<L2Block>;
}

/// ## L1Client
///
/// The L1 chain client, queried for the current tip.
#[async_trait]
pub trait L1Client: Send + Sync + 'static {
    /// Returns the header info of the latest L1 block.
    async fn latest_header(&self) -> Result<BlockInfo>;
}

/// ## EndpointProvider
///
/// Lazy accessor for the current sequencer endpoints. Implementations may
/// rebind the returned clients across failovers; the driver re-fetches
/// them on every use and never caches.
#[async_trait]
pub trait EndpointProvider: Send + Sync + 'static {
    /// The current rollup node client.
    async fn rollup_node(&self) -> Result<Arc<dyn RollupNode>>;

    /// The current L2 execution client.
    async fn l2_client(&self) -> Result<Arc<dyn L2Client>>;
}
