//! The alternative data-availability contract.
//!
//! When plasma mode is enabled, calldata is uploaded to an off-chain DA
//! store and only a commitment to it is posted on L1. The storage
//! protocol is an external collaborator; this module defines the client
//! contract and the canonical commitment encoding the derivation side
//! expects.

use alloy_primitives::{keccak256, Bytes, B256};
use async_trait::async_trait;
use eyre::Result;

/// The commitment-type byte for keccak256 commitments.
const KECCAK_256_COMMITMENT_TYPE: u8 = 0;

/// The tx-data version byte signalling a plasma commitment payload.
const TX_DATA_VERSION_1: u8 = 1;

/// A keccak256 commitment to data held by the DA store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keccak256Commitment(B256);

impl Keccak256Commitment {
    /// Commits to the given input.
    pub fn from_input(input: &[u8]) -> Self {
        Self(keccak256(input))
    }

    /// Wraps an already-computed commitment hash.
    pub fn new(hash: B256) -> Self {
        Self(hash)
    }

    /// The canonical commitment encoding: the commitment-type byte
    /// followed by the hash.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32);
        out.push(KECCAK_256_COMMITMENT_TYPE);
        out.extend_from_slice(self.0.as_slice());
        out
    }

    /// The on-chain payload replacing the raw calldata: the tx-data
    /// version byte followed by the canonical encoding.
    pub fn tx_data(&self) -> Bytes {
        let mut out = Vec::with_capacity(2 + 32);
        out.push(TX_DATA_VERSION_1);
        out.extend_from_slice(&self.encode());
        out.into()
    }
}

/// ## PlasmaClient
///
/// The external DA store client. Uploads raw bytes and returns the
/// commitment to post on L1 in their place.
#[async_trait]
pub trait PlasmaClient: Send + Sync + 'static {
    /// Stores the input and returns the commitment to it.
    async fn set_input(&self, input: Bytes) -> Result<Keccak256Commitment>;
}
