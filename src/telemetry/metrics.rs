//! Prometheus Metrics Module.

use eyre::Result;
use lazy_static::lazy_static;
use prometheus_exporter::{
    prometheus::{register_int_gauge, IntGauge},
    start,
};

lazy_static! {
    /// Tracks the most recently observed L1 tip.
    pub static ref LATEST_L1_BLOCK: IntGauge =
        register_int_gauge!("latest_l1_block", "latest observed L1 block number").unwrap();
    /// Tracks the highest L2 block loaded into the channel manager.
    pub static ref L2_BLOCKS_LOADED: IntGauge =
        register_int_gauge!("l2_blocks_loaded", "highest L2 block loaded for batching").unwrap();
    /// Tracks the bytes used in the final blob of the last blob transaction.
    pub static ref BLOB_USED_BYTES: IntGauge =
        register_int_gauge!("blob_used_bytes", "bytes used in the last partial blob").unwrap();
}

/// Starts the metrics server on port 9200
pub fn init() -> Result<()> {
    match start("0.0.0.0:9200".parse()?) {
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
