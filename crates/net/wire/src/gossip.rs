//! Gossip topic payloads: SSZ bodies under raw snappy compression.

use sha2::{Digest, Sha256};
use ssz::{Decode, Encode};

use rean_types::{
    attestation::{AggregatedAttestation, AggregationBits, AttestationData, SignedAttestation},
    block::SignedBlockWithAttestation,
    primitives::BitList,
};

use crate::WireError;

/// Gossip topic name formats; `{}` is the devnet id.
pub const BLOCK_TOPIC_FMT: &str = "/leanconsensus/{}/block/ssz_snappy";
pub const ATTESTATION_TOPIC_FMT: &str = "/leanconsensus/{}/attestation/ssz_snappy";
pub const AGGREGATE_ATTESTATION_TOPIC_FMT: &str =
    "/leanconsensus/{}/aggregate_attestation/ssz_snappy";

/// Message-id domains distinguishing decodable from undecodable payloads.
const DOMAIN_VALID_SNAPPY: [u8; 4] = [0x01, 0x00, 0x00, 0x00];
const DOMAIN_INVALID_SNAPPY: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

pub fn block_topic(devnet_id: &str) -> String {
    BLOCK_TOPIC_FMT.replace("{}", devnet_id)
}

pub fn attestation_topic(devnet_id: &str) -> String {
    ATTESTATION_TOPIC_FMT.replace("{}", devnet_id)
}

pub fn aggregate_attestation_topic(devnet_id: &str) -> String {
    AGGREGATE_ATTESTATION_TOPIC_FMT.replace("{}", devnet_id)
}

/// Compress data using raw snappy format (for gossipsub messages).
pub fn compress_message(data: &[u8]) -> Vec<u8> {
    let max_compressed_len = snap::raw::max_compress_len(data.len());
    let mut compressed = vec![0u8; max_compressed_len];
    let compressed_len = snap::raw::Encoder::new()
        .compress(data, &mut compressed)
        .expect("snappy compression should not fail");
    compressed.truncate(compressed_len);
    compressed
}

/// Decompress data using raw snappy format (for gossipsub messages).
pub fn decompress_message(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let uncompressed_size = snap::raw::decompress_len(data)?;
    if uncompressed_size > crate::MAX_PAYLOAD_SIZE {
        return Err(WireError::TooLarge(uncompressed_size as u64));
    }
    let mut uncompressed = vec![0u8; uncompressed_size];
    snap::raw::Decoder::new().decompress(data, &mut uncompressed)?;
    Ok(uncompressed)
}

/// SSZ-encode and snappy-compress a signed block for the block topic.
pub fn encode_block(block: &SignedBlockWithAttestation) -> Vec<u8> {
    compress_message(&block.as_ssz_bytes())
}

/// Decode a block topic payload.
pub fn decode_block(data: &[u8]) -> Result<SignedBlockWithAttestation, WireError> {
    let bytes = decompress_message(data)?;
    Ok(SignedBlockWithAttestation::from_ssz_bytes(&bytes)?)
}

/// SSZ-encode and snappy-compress a signed attestation.
pub fn encode_attestation(attestation: &SignedAttestation) -> Vec<u8> {
    compress_message(&attestation.as_ssz_bytes())
}

/// Decode an attestation topic payload.
pub fn decode_attestation(data: &[u8]) -> Result<SignedAttestation, WireError> {
    let bytes = decompress_message(data)?;
    Ok(SignedAttestation::from_ssz_bytes(&bytes)?)
}

/// Encode an aggregated attestation for its gossip topic.
///
/// Frame layout (before snappy):
/// `len_data(4 LE) | AttestationData SSZ | len_bits(4 LE) | bits | signatures`.
pub fn encode_aggregated_attestation(aggregate: &AggregatedAttestation) -> Vec<u8> {
    let data_ssz = aggregate.data.as_ssz_bytes();
    let bits_ssz = aggregate.aggregation_bits.as_ssz_bytes();

    let mut buf =
        Vec::with_capacity(8 + data_ssz.len() + bits_ssz.len() + aggregate.aggregated_signature.len());
    buf.extend_from_slice(&(data_ssz.len() as u32).to_le_bytes());
    buf.extend_from_slice(&data_ssz);
    buf.extend_from_slice(&(bits_ssz.len() as u32).to_le_bytes());
    buf.extend_from_slice(&bits_ssz);
    buf.extend_from_slice(&aggregate.aggregated_signature);

    compress_message(&buf)
}

/// Decode an aggregate attestation topic payload.
pub fn decode_aggregated_attestation(data: &[u8]) -> Result<AggregatedAttestation, WireError> {
    let bytes = decompress_message(data)?;
    if bytes.len() < 8 {
        return Err(WireError::InvalidLength(bytes.len()));
    }

    let mut offset = 0usize;
    let data_len = read_u32_le(&bytes, &mut offset)? as usize;
    if offset + data_len > bytes.len() {
        return Err(WireError::InvalidLength(bytes.len()));
    }
    let attestation_data = AttestationData::from_ssz_bytes(&bytes[offset..offset + data_len])?;
    offset += data_len;

    let bits_len = read_u32_le(&bytes, &mut offset)? as usize;
    if offset + bits_len > bytes.len() {
        return Err(WireError::InvalidLength(bytes.len()));
    }
    let aggregation_bits: AggregationBits =
        BitList::from_ssz_bytes(&bytes[offset..offset + bits_len])?;
    offset += bits_len;

    let aggregated_signature = bytes[offset..]
        .to_vec()
        .try_into()
        .map_err(|_| WireError::InvalidLength(bytes.len() - offset))?;

    Ok(AggregatedAttestation {
        data: attestation_data,
        aggregation_bits,
        aggregated_signature,
    })
}

fn read_u32_le(bytes: &[u8], offset: &mut usize) -> Result<u32, WireError> {
    let end = *offset + 4;
    if end > bytes.len() {
        return Err(WireError::InvalidLength(bytes.len()));
    }
    let value = u32::from_le_bytes(bytes[*offset..end].try_into().expect("4 bytes"));
    *offset = end;
    Ok(value)
}

/// Compute the gossip message id: SHA256(domain | topic_len_le(8) | topic | data)[..20].
///
/// `data` is the decompressed payload when snappy decoding succeeds,
/// otherwise the raw bytes under the invalid-snappy domain.
pub fn compute_message_id(topic: &str, raw_data: &[u8]) -> [u8; 20] {
    let (domain, message_data) = match decompress_message(raw_data) {
        Ok(decoded) => (DOMAIN_VALID_SNAPPY, decoded),
        Err(_) => (DOMAIN_INVALID_SNAPPY, raw_data.to_vec()),
    };

    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update((topic.len() as u64).to_le_bytes());
    hasher.update(topic.as_bytes());
    hasher.update(&message_data);

    let digest = hasher.finalize();
    digest[..20].try_into().expect("20 byte prefix")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rean_types::{
        attestation::Attestation,
        block::{Block, BlockBody, SignedBlockWithAttestation},
        primitives::H256,
        state::Checkpoint,
    };

    fn sample_attestation() -> SignedAttestation {
        let checkpoint = Checkpoint {
            root: H256::from([7u8; 32]),
            slot: 3,
        };
        SignedAttestation {
            message: Attestation {
                validator_id: 2,
                data: AttestationData {
                    slot: 4,
                    head: checkpoint,
                    target: checkpoint,
                    source: checkpoint,
                },
            },
            signature: Default::default(),
        }
    }

    #[test]
    fn snappy_roundtrip() {
        let data = b"lean consensus".repeat(100);
        let compressed = compress_message(&data);
        assert!(compressed.len() < data.len());
        assert_eq!(decompress_message(&compressed).unwrap(), data);
    }

    #[test]
    fn block_topic_roundtrip() {
        let block = SignedBlockWithAttestation::unsigned(Block {
            slot: 9,
            proposer_index: 4,
            parent_root: H256::from([1u8; 32]),
            state_root: H256::from([2u8; 32]),
            body: BlockBody::default(),
        });

        let encoded = encode_block(&block);
        let decoded = decode_block(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn attestation_topic_roundtrip() {
        let attestation = sample_attestation();
        let decoded = decode_attestation(&encode_attestation(&attestation)).unwrap();
        assert_eq!(decoded, attestation);
    }

    #[test]
    fn aggregate_frame_roundtrip() {
        let base = sample_attestation();
        let mut bits = AggregationBits::with_capacity(3).unwrap();
        bits.set(0, true).unwrap();
        bits.set(2, true).unwrap();
        let signatures = vec![0xab; 2 * rean_types::signature::SIGNATURE_SIZE];
        let aggregate = AggregatedAttestation {
            data: base.message.data,
            aggregation_bits: bits,
            aggregated_signature: signatures.try_into().unwrap(),
        };

        let decoded = decode_aggregated_attestation(&encode_aggregated_attestation(&aggregate))
            .unwrap();
        assert_eq!(decoded, aggregate);
    }

    #[test]
    fn message_id_is_stable_and_topic_sensitive() {
        let payload = compress_message(b"payload");
        let id1 = compute_message_id("/leanconsensus/devnet0/block/ssz_snappy", &payload);
        let id2 = compute_message_id("/leanconsensus/devnet0/block/ssz_snappy", &payload);
        let id3 = compute_message_id("/leanconsensus/devnet0/attestation/ssz_snappy", &payload);
        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn topic_names_include_devnet_id() {
        assert_eq!(block_topic("devnet0"), "/leanconsensus/devnet0/block/ssz_snappy");
        assert_eq!(
            aggregate_attestation_topic("devnet0"),
            "/leanconsensus/devnet0/aggregate_attestation/ssz_snappy"
        );
    }
}
