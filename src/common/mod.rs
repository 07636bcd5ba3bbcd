//! Module containing common types and functions used throughout the crate.

use std::fmt::{Debug, Display};

use alloy_primitives::B256;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

/// A `(hash, number)` pair identifying a block.
///
/// The zero value doubles as the "empty" sentinel for driver bookmarks.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct BlockId {
    /// The block hash
    pub hash: B256,
    /// The block number
    pub number: u64,
}

impl BlockId {
    /// Constructs a new [BlockId]
    pub fn new(hash: B256, number: u64) -> Self {
        Self { hash, number }
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hash, self.number)
    }
}

/// Selected block header info
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The block hash
    pub hash: B256,
    /// The block number
    pub number: u64,
    /// The parent block hash
    pub parent_hash: B256,
    /// The block timestamp
    pub timestamp: u64,
}

impl BlockInfo {
    /// The `(hash, number)` identifier of this block
    pub fn id(&self) -> BlockId {
        BlockId {
            hash: self.hash,
            number: self.number,
        }
    }
}

/// A raw transaction
#[derive(Clone, alloy_rlp::RlpDecodable, alloy_rlp::RlpEncodable, PartialEq, Eq)]
pub struct RawTransaction(pub Vec<u8>);

/// An L2 block as handed to the channel manager: header info plus the raw
/// transactions the channel compresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L2Block {
    /// Selected header fields
    pub info: BlockInfo,
    /// The raw transactions included in the block
    pub transactions: Vec<RawTransaction>,
}

impl L2Block {
    /// The `(hash, number)` identifier of this block
    pub fn id(&self) -> BlockId {
        self.info.id()
    }
}

/// The sequencer's view of chain progress, as reported by the rollup node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// The current L1 head
    pub head_l1: BlockInfo,
    /// The highest L2 block derivable from data already on L1
    pub safe_l2: BlockInfo,
    /// The highest L2 block produced by the sequencer
    pub unsafe_l2: BlockInfo,
}

impl Debug for RawTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for RawTransaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for RawTransaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tx: String = serde::Deserialize::deserialize(deserializer)?;
        let tx = tx.strip_prefix("0x").unwrap_or(&tx);
        Ok(RawTransaction(hex::decode(tx).map_err(D::Error::custom)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_block_id_display() {
        let id = BlockId::new(
            b256!("dbf6a80fef073de06add9b0d14026d6e5a86c85f6d102c36d3d8e9cf89c2afd3"),
            105235063,
        );
        assert!(id.to_string().ends_with(":105235063"));
        assert_ne!(id, BlockId::default());
    }

    #[test]
    fn test_raw_transaction_serde_round_trip() {
        let tx = RawTransaction(vec![0xde, 0xad, 0xbe, 0xef]);
        let encoded = serde_json::to_string(&tx).unwrap();
        assert_eq!(encoded, "\"0xdeadbeef\"");
        let decoded: RawTransaction = serde_json::from_str(&encoded).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn test_sync_status_from_json() {
        let raw = r#"{
            "head_l1": { "hash": "0x438335a20d98863a4c0c97999eb2481921ccd28553eac6f913af7c12aec04108", "number": 17422590, "parent_hash": "0x21a168dfa5e727926063a28ba16fd5ee84c814e847c81a699c7a0ea551e4ca50", "timestamp": 1686068903 },
            "safe_l2": { "hash": "0xdbf6a80fef073de06add9b0d14026d6e5a86c85f6d102c36d3d8e9cf89c2afd3", "number": 105235063, "parent_hash": "0x21a168dfa5e727926063a28ba16fd5ee84c814e847c81a699c7a0ea551e4ca50", "timestamp": 1686068903 },
            "unsafe_l2": { "hash": "0x2e4f4aff36bb7951be9742ad349fb1db84643c6bbac5014f3d196fd88fe333eb", "number": 105235065, "parent_hash": "0xdbf6a80fef073de06add9b0d14026d6e5a86c85f6d102c36d3d8e9cf89c2afd3", "timestamp": 1686068907 }
        }"#;
        let status: SyncStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.safe_l2.number, 105235063);
        assert_eq!(status.safe_l2.id().number, 105235063);
        assert!(status.safe_l2.number < status.unsafe_l2.number);
    }
}
