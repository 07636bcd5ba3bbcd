//! The blob sideband encoding used for batcher payloads.
//!
//! A blob is 4096 field elements of 32 bytes each. The top two bits of
//! every field element must stay clear, so payload bytes are packed 31 to
//! an element plus a 6-bit chunk in the first byte; groups of four chunks
//! reassemble into three payload bytes. The first element additionally
//! carries the encoding version and a 24-bit big-endian payload length.

use alloy_primitives::Bytes;
use eyre::Result;

/// The size of an EIP-4844 blob in bytes.
pub const BLOB_SIZE: usize = 4096 * 32;

/// The maximum payload one blob can carry under this encoding.
pub const MAX_BLOB_DATA_SIZE: usize = (4 * 31 + 3) * 1024 - 4;

const ENCODING_VERSION: u8 = 0;
const VERSION_OFFSET: usize = 1;
const ROUNDS: usize = 1024;

/// A fixed-size EIP-4844 data blob.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Box<[u8; BLOB_SIZE]>);

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blob(0x{}...)", hex::encode(&self.0[..8]))
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Blob {
    /// Encodes a payload into a blob.
    ///
    /// Errors if the payload exceeds [MAX_BLOB_DATA_SIZE].
    pub fn from_data(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_BLOB_DATA_SIZE {
            eyre::bail!(
                "Blob encoding: payload of {} bytes exceeds maximum {}",
                data.len(),
                MAX_BLOB_DATA_SIZE
            );
        }

        let mut blob = Box::new([0u8; BLOB_SIZE]);
        blob[VERSION_OFFSET] = ENCODING_VERSION;

        // the 3-byte big-endian payload length
        blob[2] = (data.len() >> 16) as u8;
        blob[3] = (data.len() >> 8) as u8;
        blob[4] = data.len() as u8;

        // the first field element also carries the first 27 payload bytes
        let n = data.len().min(27);
        blob[5..5 + n].copy_from_slice(&data[..n]);
        copy_segment(data, 28, &mut blob[..], 33);
        copy_segment(data, 60, &mut blob[..], 65);
        copy_segment(data, 92, &mut blob[..], 97);
        write_chunks(data, 27, &mut blob[..], 0);

        for round in 1..ROUNDS {
            let out_base = 123 + 127 * (round - 1);
            if out_base >= data.len() {
                break;
            }
            let in_base = 128 * round;
            copy_segment(data, out_base, &mut blob[..], in_base + 1);
            copy_segment(data, out_base + 32, &mut blob[..], in_base + 33);
            copy_segment(data, out_base + 64, &mut blob[..], in_base + 65);
            copy_segment(data, out_base + 96, &mut blob[..], in_base + 97);
            write_chunks(data, out_base + 31, &mut blob[..], in_base);
        }

        Ok(Self(blob))
    }
}

/// Copies up to 31 payload bytes into a field-element body, zero-padding
/// past the end of the payload.
fn copy_segment(data: &[u8], from: usize, blob: &mut [u8], to: usize) {
    if from >= data.len() {
        return;
    }
    let n = (data.len() - from).min(31);
    blob[to..to + n].copy_from_slice(&data[from..from + n]);
}

/// Splits the three reassembled bytes of a round across the four 6-bit
/// chunks leading the round's field elements.
fn write_chunks(data: &[u8], x_pos: usize, blob: &mut [u8], in_base: usize) {
    let read = |pos: usize| data.get(pos).copied().unwrap_or(0);
    let x = read(x_pos);
    let y = read(x_pos + 32);
    let z = read(x_pos + 64);

    blob[in_base] = x & 0b0011_1111;
    blob[in_base + 32] = ((x & 0b1100_0000) >> 2) | (y & 0b0000_1111);
    blob[in_base + 64] = z & 0b0011_1111;
    blob[in_base + 96] = ((z & 0b1100_0000) >> 2) | ((y & 0b1111_0000) >> 4);
}

/// Decodes the payload carried by a blob of data
pub fn decode_blob_data(blob: &[u8]) -> Result<Bytes> {
    let mut output = vec![0; MAX_BLOB_DATA_SIZE];

    if blob[VERSION_OFFSET] != ENCODING_VERSION {
        eyre::bail!(
            "Blob decoding: Invalid encoding version: want {}, got {}",
            ENCODING_VERSION,
            blob[VERSION_OFFSET]
        );
    }

    // decode the 3-byte big-endian length value into a 4-byte integer
    let output_len = u32::from_be_bytes([0, blob[2], blob[3], blob[4]]) as usize;
    if output_len > MAX_BLOB_DATA_SIZE {
        eyre::bail!(
            "Blob decoding: Invalid length: {} exceeds maximum {}",
            output_len,
            MAX_BLOB_DATA_SIZE
        );
    }

    output[0..27].copy_from_slice(&blob[5..32]);

    let mut output_pos = 28;
    let mut input_pos = 32;

    // buffer for the 4 6-bit chunks
    let mut encoded_byte = [0; 4];

    encoded_byte[0] = blob[0];
    for byte in encoded_byte.iter_mut().skip(1) {
        *byte = decode_field_element(&mut output_pos, &mut input_pos, blob, &mut output)?;
    }
    reassemble_bytes(&mut output_pos, encoded_byte, &mut output);

    for _ in 1..ROUNDS {
        if output_pos >= output_len {
            break;
        }

        for byte in encoded_byte.iter_mut() {
            *byte = decode_field_element(&mut output_pos, &mut input_pos, blob, &mut output)?;
        }
        reassemble_bytes(&mut output_pos, encoded_byte, &mut output);
    }

    for output_byte in output.iter().take(MAX_BLOB_DATA_SIZE).skip(output_len) {
        if output_byte != &0 {
            eyre::bail!(
                "Blob decoding: Extraneous data in field element {}",
                output_pos / 32
            );
        }
    }

    output.truncate(output_len);

    for byte in blob.iter().skip(input_pos) {
        if byte != &0 {
            eyre::bail!(
                "Blob decoding: Extraneous data in input position {}",
                input_pos
            );
        }
    }

    Ok(output.into())
}

fn decode_field_element(
    output_pos: &mut usize,
    input_pos: &mut usize,
    blob: &[u8],
    output: &mut [u8],
) -> Result<u8> {
    let result = blob[*input_pos];

    // two highest order bits of the first byte of each field element should always be 0
    if result & 0b1100_0000 != 0 {
        eyre::bail!("Blob decoding: Invalid field element");
    }

    output[*output_pos..*output_pos + 31].copy_from_slice(&blob[*input_pos + 1..*input_pos + 32]);

    *output_pos += 32;
    *input_pos += 32;

    Ok(result)
}

fn reassemble_bytes(output_pos: &mut usize, encoded_byte: [u8; 4], output: &mut [u8]) {
    *output_pos -= 1;

    let x = (encoded_byte[0] & 0b0011_1111) | ((encoded_byte[1] & 0b0011_0000) << 2);
    let y = (encoded_byte[1] & 0b0000_1111) | ((encoded_byte[3] & 0b0000_1111) << 4);
    let z = (encoded_byte[2] & 0b0011_1111) | ((encoded_byte[3] & 0b0011_0000) << 2);

    output[*output_pos - 32] = z;
    output[*output_pos - (32 * 2)] = y;
    output[*output_pos - (32 * 3)] = x;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn test_round_trip_at_boundaries() {
        for len in [0, 1, 27, 28, 59, 92, 123, 124, 4096, MAX_BLOB_DATA_SIZE] {
            let data = pattern(len);
            let blob = Blob::from_data(&data).unwrap();
            let decoded = decode_blob_data(blob.as_ref()).unwrap();
            assert_eq!(decoded.as_ref(), &data[..], "round trip failed for {len}");
        }
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let data = pattern(MAX_BLOB_DATA_SIZE + 1);
        assert!(Blob::from_data(&data).is_err());
    }

    #[test]
    fn test_rejects_bad_version() {
        let blob = Blob::from_data(&pattern(100)).unwrap();
        let mut raw = blob.as_ref().to_vec();
        raw[VERSION_OFFSET] = 0xff;
        assert!(decode_blob_data(&raw).is_err());
    }

    #[test]
    fn test_field_elements_stay_canonical() {
        let blob = Blob::from_data(&pattern(MAX_BLOB_DATA_SIZE)).unwrap();
        for element in blob.as_ref().chunks(32) {
            assert_eq!(element[0] & 0b1100_0000, 0);
        }
    }
}
