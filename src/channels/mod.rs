//! The channel-manager contract and the submittable unit it emits.
//!
//! A channel manager compresses a run of L2 blocks into one or more
//! channels, splits each channel into frames, and emits frames bundled
//! into submittable units. How it compresses and frames is its own
//! business; the driver only consumes the contract defined here.

use std::fmt::Display;

use alloy_primitives::Bytes;
use eyre::Result;

use crate::common::{BlockId, L2Block};
use crate::l1::Blob;

/// ChannelId is a 16-byte identifier for a channel.
pub type ChannelId = [u8; 16];

/// The version byte prefixed to every batcher payload on the wire.
pub const DERIVATION_VERSION_0: u8 = 0;

/// Identifies a single frame within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    /// The channel this frame belongs to
    pub channel: ChannelId,
    /// The index of this frame within the channel
    pub number: u16,
}

impl Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.channel), self.number)
    }
}

/// A single channel frame: the smallest unit an inbox transaction carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame identifier
    pub id: FrameId,
    /// The opaque frame bytes
    pub data: Bytes,
}

/// Identifies a submittable unit by the frames it carries.
///
/// Chosen by the channel manager, unique for the driver's lifetime, and
/// stable across transaction-manager retries and replacements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TxId(pub Vec<FrameId>);

impl Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for id in &self.0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{id}")?;
            first = false;
        }
        Ok(())
    }
}

/// A submittable unit of channel data: an ordered list of frames destined
/// for a single inbox transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    /// The frames this unit carries, in order
    pub frames: Vec<Frame>,
}

impl TxData {
    /// Constructs a unit from a list of frames
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// The identifier correlating this unit with its eventual receipt
    pub fn id(&self) -> TxId {
        TxId(self.frames.iter().map(|f| f.id).collect())
    }

    /// Total number of frame bytes in this unit
    pub fn len(&self) -> usize {
        self.frames.iter().map(|f| f.data.len()).sum()
    }

    /// `true` if the unit carries no frame bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the unit as inbox calldata: the derivation version byte
    /// followed by the concatenated frame bytes.
    ///
    /// Only a single-frame unit is valid on the calldata wire; the driver
    /// enforces that before submitting.
    pub fn call_data(&self) -> Bytes {
        let mut data = Vec::with_capacity(1 + self.len());
        data.push(DERIVATION_VERSION_0);
        for frame in &self.frames {
            data.extend_from_slice(&frame.data);
        }
        data.into()
    }

    /// Renders the unit as EIP-4844 blobs, one per frame, in order. Each
    /// blob encodes the version byte followed by the frame bytes.
    pub fn blobs(&self) -> Result<Vec<Blob>> {
        let mut blobs = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let mut data = Vec::with_capacity(1 + frame.data.len());
            data.push(DERIVATION_VERSION_0);
            data.extend_from_slice(&frame.data);
            blobs.push(Blob::from_data(&data)?);
        }
        Ok(blobs)
    }
}

/// The outcome of appending an L2 block to the channel manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockUpdate {
    /// The block extends the manager's chain and was queued for batching
    Added,
    /// The block's parent hash does not match the manager's tip
    Reorg,
}

/// The outcome of closing the channel manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// No channel data remained when the manager closed
    Clean,
    /// In-flight channel data remains and can still be emitted
    PendingData,
}

/// ## ChannelManager
///
/// The stateful collaborator that turns L2 blocks into submittable units.
/// Implementations must be internally synchronised: the driver loop and
/// the receipt fan-in call into the manager concurrently.
pub trait ChannelManager: Send + Sync + 'static {
    /// Appends an L2 block to the current channel.
    ///
    /// Returns [BlockUpdate::Reorg] if the block does not extend the last
    /// block the manager has seen.
    fn add_l2_block(&self, block: L2Block) -> BlockUpdate;

    /// Returns the next submittable unit, or `None` when nothing is ready.
    ///
    /// `l1_tip` is the current L1 head; the manager may use it to time
    /// frame emission.
    fn tx_data(&self, l1_tip: BlockId) -> Result<Option<TxData>>;

    /// Marks a previously emitted unit as included on L1.
    fn tx_confirmed(&self, id: &TxId, l1_block: BlockId);

    /// Marks a previously emitted unit as failed so it can be requeued.
    fn tx_failed(&self, id: &TxId);

    /// Terminates the currently building channel so its buffered data can
    /// still be emitted and submitted.
    fn close(&self) -> CloseOutcome;

    /// Drops all state.
    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(channel: u8, number: u16, data: &[u8]) -> Frame {
        Frame {
            id: FrameId {
                channel: [channel; 16],
                number,
            },
            data: data.to_vec().into(),
        }
    }

    #[test]
    fn test_call_data_prefixes_version_byte() {
        let data = TxData::new(vec![frame(1, 0, &[0xaa, 0xbb])]);
        assert_eq!(data.call_data().as_ref(), &[0x00, 0xaa, 0xbb]);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_blobs_one_per_frame() {
        let data = TxData::new(vec![frame(1, 0, &[0xaa; 100]), frame(1, 1, &[0xbb; 50])]);
        let blobs = data.blobs().unwrap();
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn test_tx_id_display() {
        let data = TxData::new(vec![frame(0xab, 0, &[1]), frame(0xab, 1, &[2])]);
        let id = data.id();
        let repr = id.to_string();
        assert!(repr.contains(&hex::encode([0xab; 16])));
        assert!(repr.contains('|'));
    }
}
