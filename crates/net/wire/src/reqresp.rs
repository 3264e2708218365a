//! Request/response payload codecs.
//!
//! Every req/resp payload travels as a uvarint length prefix (of the
//! uncompressed data) followed by a snappy *frame* encoding of the data.
//! Response streams prefix each chunk with a one-byte response code.

use std::io::{self, Read, Write};

use ssz::{Decode, Encode};

use rean_types::{
    MAX_REQUEST_BLOCKS,
    block::SignedBlockWithAttestation,
    primitives::H256,
    state::Checkpoint,
};

use crate::{MAX_PAYLOAD_SIZE, WireError};

/// Protocol IDs matching cross-client convention (ssz_snappy encoding suffix).
pub const STATUS_PROTOCOL_V1: &str = "/leanconsensus/req/status/1/ssz_snappy";
pub const BLOCKS_BY_ROOT_PROTOCOL_V1: &str = "/leanconsensus/req/blocks_by_root/1/ssz_snappy";

/// Response status codes.
pub const RESPONSE_SUCCESS: u8 = 0x00;
pub const RESPONSE_INVALID_REQUEST: u8 = 0x01;
pub const RESPONSE_SERVER_ERROR: u8 = 0x02;
pub const RESPONSE_RESOURCE_UNAVAILABLE: u8 = 0x03;

const STATUS_PAYLOAD_SIZE: usize = 80;

/// The status message exchanged between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub finalized: Checkpoint,
    pub head: Checkpoint,
}

impl Status {
    /// Fixed 80-byte layout:
    /// `finalized.root(32) | finalized.slot(8 LE) | head.root(32) | head.slot(8 LE)`.
    pub fn to_bytes(&self) -> [u8; STATUS_PAYLOAD_SIZE] {
        let mut buf = [0u8; STATUS_PAYLOAD_SIZE];
        buf[0..32].copy_from_slice(self.finalized.root.as_slice());
        buf[32..40].copy_from_slice(&self.finalized.slot.to_le_bytes());
        buf[40..72].copy_from_slice(self.head.root.as_slice());
        buf[72..80].copy_from_slice(&self.head.slot.to_le_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        if data.len() != STATUS_PAYLOAD_SIZE {
            return Err(WireError::InvalidLength(data.len()));
        }
        Ok(Self {
            finalized: Checkpoint {
                root: H256::from_slice(&data[0..32]),
                slot: u64::from_le_bytes(data[32..40].try_into().expect("8 bytes")),
            },
            head: Checkpoint {
                root: H256::from_slice(&data[40..72]),
                slot: u64::from_le_bytes(data[72..80].try_into().expect("8 bytes")),
            },
        })
    }
}

/// Write a uvarint-prefixed, snappy-frame-encoded message.
pub fn write_snappy_frame<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), WireError> {
    write_uvarint(writer, data.len() as u64)?;

    let mut encoder = snap::read::FrameEncoder::new(data);
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed)?;
    writer.write_all(&compressed)?;
    Ok(())
}

/// Read a uvarint-prefixed, snappy-frame-encoded message.
pub fn read_snappy_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, WireError> {
    let length = read_uvarint(reader)?;
    if length > MAX_PAYLOAD_SIZE as u64 {
        return Err(WireError::TooLarge(length));
    }

    let mut decoder = snap::read::FrameDecoder::new(reader);
    let mut decoded = vec![0u8; length as usize];
    decoder.read_exact(&mut decoded)?;
    Ok(decoded)
}

/// Encode a u64 as a protobuf-style unsigned varint.
pub fn write_uvarint<W: Write>(writer: &mut W, mut value: u64) -> Result<(), WireError> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        if value == 0 {
            return Ok(());
        }
    }
}

/// Decode a protobuf-style unsigned varint, rejecting overlong encodings.
pub fn read_uvarint<R: Read>(reader: &mut R) -> Result<u64, WireError> {
    let mut value = 0u64;
    for i in 0..10 {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        value |= ((byte[0] & 0x7f) as u64) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(WireError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        "uvarint too long",
    )))
}

/// Write a status request/response payload.
pub fn write_status<W: Write>(writer: &mut W, status: &Status) -> Result<(), WireError> {
    write_snappy_frame(writer, &status.to_bytes())
}

/// Read a status request/response payload.
pub fn read_status<R: Read>(reader: &mut R) -> Result<Status, WireError> {
    let data = read_snappy_frame(reader)?;
    Status::from_bytes(&data)
}

/// Write a blocks-by-root request: concatenated 32-byte roots.
pub fn write_blocks_by_root_request<W: Write>(
    writer: &mut W,
    roots: &[H256],
) -> Result<(), WireError> {
    if roots.len() > MAX_REQUEST_BLOCKS {
        return Err(WireError::TooManyRoots(roots.len()));
    }
    let mut data = Vec::with_capacity(roots.len() * 32);
    for root in roots {
        data.extend_from_slice(root.as_slice());
    }
    write_snappy_frame(writer, &data)
}

/// Read a blocks-by-root request.
pub fn read_blocks_by_root_request<R: Read>(reader: &mut R) -> Result<Vec<H256>, WireError> {
    let data = read_snappy_frame(reader)?;
    if data.len() % 32 != 0 {
        return Err(WireError::InvalidLength(data.len()));
    }
    let count = data.len() / 32;
    if count > MAX_REQUEST_BLOCKS {
        return Err(WireError::TooManyRoots(count));
    }
    Ok(data.chunks_exact(32).map(H256::from_slice).collect())
}

/// Write one response chunk: a status byte, then the snappy-framed block
/// when the code is success.
pub fn write_block_chunk<W: Write>(
    writer: &mut W,
    code: u8,
    block: Option<&SignedBlockWithAttestation>,
) -> Result<(), WireError> {
    writer.write_all(&[code])?;
    if let Some(block) = block {
        write_snappy_frame(writer, &block.as_ssz_bytes())?;
    }
    Ok(())
}

/// Read a single response status byte.
pub fn read_response_code<R: Read>(reader: &mut R) -> Result<u8, WireError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Read a snappy-framed signed block payload.
pub fn read_block<R: Read>(reader: &mut R) -> Result<SignedBlockWithAttestation, WireError> {
    let data = read_snappy_frame(reader)?;
    Ok(SignedBlockWithAttestation::from_ssz_bytes(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rean_types::block::{Block, BlockBody};

    fn sample_status() -> Status {
        Status {
            finalized: Checkpoint {
                root: H256::from([3u8; 32]),
                slot: 11,
            },
            head: Checkpoint {
                root: H256::from([9u8; 32]),
                slot: 42,
            },
        }
    }

    #[test]
    fn uvarint_roundtrip() {
        for value in [0u64, 1, 127, 128, 150, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_uvarint(&mut buf, value).unwrap();
            let decoded = read_uvarint(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, value);
        }
        // Example from the protobuf encoding guide.
        let mut buf = Vec::new();
        write_uvarint(&mut buf, 150).unwrap();
        assert_eq!(buf, vec![0b1001_0110, 0b0000_0001]);
    }

    #[test]
    fn snappy_frame_roundtrip() {
        let data = b"status exchange".repeat(64);
        let mut buf = Vec::new();
        write_snappy_frame(&mut buf, &data).unwrap();
        let decoded = read_snappy_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn status_payload_is_80_bytes_little_endian() {
        let status = sample_status();
        let bytes = status.to_bytes();
        assert_eq!(bytes.len(), 80);
        assert_eq!(bytes[32], 11); // finalized.slot LE
        assert_eq!(bytes[72], 42); // head.slot LE
        assert_eq!(Status::from_bytes(&bytes).unwrap(), status);
    }

    #[test]
    fn status_roundtrip_over_wire() {
        let status = sample_status();
        let mut buf = Vec::new();
        write_status(&mut buf, &status).unwrap();
        assert_eq!(read_status(&mut buf.as_slice()).unwrap(), status);
    }

    #[test]
    fn status_rejects_wrong_length() {
        assert!(Status::from_bytes(&[0u8; 79]).is_err());
    }

    #[test]
    fn blocks_by_root_request_roundtrip() {
        let roots = vec![H256::from([1u8; 32]), H256::from([2u8; 32])];
        let mut buf = Vec::new();
        write_blocks_by_root_request(&mut buf, &roots).unwrap();
        assert_eq!(read_blocks_by_root_request(&mut buf.as_slice()).unwrap(), roots);
    }

    #[test]
    fn blocks_by_root_request_rejects_excess() {
        let roots = vec![H256::ZERO; MAX_REQUEST_BLOCKS + 1];
        let mut buf = Vec::new();
        assert!(matches!(
            write_blocks_by_root_request(&mut buf, &roots),
            Err(WireError::TooManyRoots(_))
        ));
    }

    #[test]
    fn block_chunk_roundtrip() {
        let block = SignedBlockWithAttestation::unsigned(Block {
            slot: 5,
            proposer_index: 0,
            parent_root: H256::from([4u8; 32]),
            state_root: H256::from([5u8; 32]),
            body: BlockBody::default(),
        });

        let mut buf = Vec::new();
        write_block_chunk(&mut buf, RESPONSE_SUCCESS, Some(&block)).unwrap();

        let mut reader = buf.as_slice();
        assert_eq!(read_response_code(&mut reader).unwrap(), RESPONSE_SUCCESS);
        assert_eq!(read_block(&mut reader).unwrap(), block);
    }

    #[test]
    fn error_chunk_has_no_body() {
        let mut buf = Vec::new();
        write_block_chunk(&mut buf, RESPONSE_RESOURCE_UNAVAILABLE, None).unwrap();
        assert_eq!(buf, vec![RESPONSE_RESOURCE_UNAVAILABLE]);
    }
}
