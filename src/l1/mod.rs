//! L1 wire objects: the EIP-4844 blob and its sideband data encoding.

/// Blob data encoding and decoding
pub mod blob_encoding;
pub use blob_encoding::{decode_blob_data, Blob, BLOB_SIZE, MAX_BLOB_DATA_SIZE};
