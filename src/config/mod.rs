//! Configuration for the batch submitter.

use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Batch submitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between driver ticks
    pub poll_interval: Duration,
    /// Timeout applied to every individual RPC call
    pub network_timeout: Duration,
    /// Maximum number of L1 transactions in flight at once. 0 disables the cap.
    pub max_pending_transactions: usize,
    /// Submit channel frames as EIP-4844 blob transactions instead of calldata
    pub use_blobs: bool,
    /// Post calldata to the alt-DA provider and submit only the commitment
    pub use_plasma: bool,
    /// The rollup chain config
    pub chain: ChainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
            network_timeout: Duration::from_secs(10),
            max_pending_transactions: 1,
            use_blobs: false,
            use_plasma: false,
            chain: ChainConfig::default(),
        }
    }
}

/// A Chain Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The batch inbox address
    pub batch_inbox: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            batch_inbox: address!("ff00000000000000000000000000000000000010"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_pending_transactions, 1);
        assert!(!config.use_blobs);
        assert!(!config.use_plasma);
        assert!(!config.chain.batch_inbox.is_zero());
    }
}
