//! Attestation aggregation: same-data attestations with concatenated
//! signatures, ordered by ascending validator index.

use rean_crypto::Verifier;
use rean_storage::Storage;
use rean_types::{
    INTERVALS_PER_SLOT,
    attestation::{
        AggregatedAttestation, AggregatedSignatureBytes, AggregationBits, Attestation,
        SignedAttestation,
    },
    primitives::ssz::TreeHash,
    signature::{SIGNATURE_SIZE, Signature},
};
use tracing::{debug, warn};

use crate::{Store, metrics};

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("no attestations to aggregate")]
    EmptyInput,
    #[error("attestations disagree on attestation data")]
    DataMismatch,
    #[error("validator index {0} exceeds the aggregation bitfield limit")]
    ValidatorOutOfRange(u64),
    #[error("aggregated signature length mismatch: got {got}, expected {expected}")]
    SignatureLengthMismatch { got: usize, expected: usize },
}

/// Collect attestations over the same data into a single aggregate,
/// concatenating their XMSS signatures in ascending validator index order.
pub fn aggregate_attestations(
    attestations: &[SignedAttestation],
) -> Result<AggregatedAttestation, AggregationError> {
    let first = attestations.first().ok_or(AggregationError::EmptyInput)?;
    let data = first.message.data.clone();
    if attestations
        .iter()
        .any(|signed| signed.message.data != data)
    {
        return Err(AggregationError::DataMismatch);
    }

    let mut sorted: Vec<&SignedAttestation> = attestations.iter().collect();
    sorted.sort_by_key(|signed| signed.message.validator_id);

    let max_id = sorted
        .last()
        .expect("non-empty input checked above")
        .message
        .validator_id;
    let mut bits = AggregationBits::with_capacity(max_id as usize + 1)
        .map_err(|_| AggregationError::ValidatorOutOfRange(max_id))?;
    for signed in &sorted {
        bits.set(signed.message.validator_id as usize, true)
            .expect("index within capacity");
    }

    let mut signature_bytes = Vec::with_capacity(sorted.len() * SIGNATURE_SIZE);
    for signed in &sorted {
        signature_bytes.extend_from_slice(&signed.signature[..]);
    }
    let aggregated_signature = AggregatedSignatureBytes::new(signature_bytes)
        .map_err(|_| AggregationError::ValidatorOutOfRange(max_id))?;

    Ok(AggregatedAttestation {
        data,
        aggregation_bits: bits,
        aggregated_signature,
    })
}

/// Split an aggregate back into per-validator signature pairs.
pub fn disaggregate_attestation(
    aggregate: &AggregatedAttestation,
) -> Result<Vec<(u64, Signature)>, AggregationError> {
    let validator_ids: Vec<u64> = (0..aggregate.aggregation_bits.len())
        .filter(|i| aggregate.aggregation_bits.get(*i).unwrap_or(false))
        .map(|i| i as u64)
        .collect();

    let expected = validator_ids.len() * SIGNATURE_SIZE;
    let got = aggregate.aggregated_signature.len();
    if got != expected {
        return Err(AggregationError::SignatureLengthMismatch { got, expected });
    }

    let signatures = validator_ids
        .iter()
        .enumerate()
        .map(|(i, validator_id)| {
            let bytes =
                aggregate.aggregated_signature[i * SIGNATURE_SIZE..(i + 1) * SIGNATURE_SIZE].to_vec();
            let signature = Signature::new(bytes).expect("exact signature size");
            (*validator_id, signature)
        })
        .collect();

    Ok(signatures)
}

impl<V: Verifier> Store<V> {
    /// Validate an aggregated attestation and fold each participant's
    /// vote into the pending set under the usual gossip rules.
    pub fn process_aggregated_attestation(&self, aggregate: &AggregatedAttestation) {
        let mut inner = self.lock_inner();
        if let Some(clock) = self.clock_ref() {
            inner.advance_time(clock.now_unix(), false);
        }

        if let Some(reason) = inner.validate_attestation(&aggregate.data) {
            debug!(
                slot = aggregate.data.slot,
                reason = reason.as_str(),
                "Aggregated attestation rejected"
            );
            metrics::inc_attestations_rejected("aggregate", reason.as_str());
            return;
        }

        let Some(head_state) = inner.storage.get_state(&inner.head) else {
            return;
        };

        let pairs = match disaggregate_attestation(aggregate) {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!(%err, "Failed to disaggregate attestation");
                return;
            }
        };

        let current_slot = inner.time / INTERVALS_PER_SLOT;

        for (validator_id, signature) in pairs {
            if validator_id >= head_state.num_validators() {
                continue;
            }
            let attestation = Attestation {
                validator_id,
                data: aggregate.data.clone(),
            };
            let message = attestation.tree_hash_root();
            let context = aggregate.data.slot as u32;
            let pubkey = &head_state.validators[validator_id as usize].pubkey;
            if self
                .verifier()
                .verify(pubkey, context, &message, &signature)
                .is_err()
            {
                metrics::inc_attestations_invalid("aggregate");
                continue;
            }
            if aggregate.data.slot > current_slot {
                continue;
            }

            let replace = inner
                .latest_new_attestations
                .get(&validator_id)
                .is_none_or(|existing| existing.message.data.slot < aggregate.data.slot);
            if replace {
                inner.latest_new_attestations.insert(
                    validator_id,
                    SignedAttestation {
                        message: attestation,
                        signature,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rean_types::{
        attestation::AttestationData,
        primitives::H256,
        state::Checkpoint,
    };

    fn signed(validator_id: u64, fill: u8) -> SignedAttestation {
        let checkpoint = Checkpoint {
            root: H256::from([1u8; 32]),
            slot: 0,
        };
        SignedAttestation {
            message: Attestation {
                validator_id,
                data: AttestationData {
                    slot: 1,
                    head: checkpoint,
                    target: checkpoint,
                    source: checkpoint,
                },
            },
            signature: Signature::new(vec![fill; SIGNATURE_SIZE]).unwrap(),
        }
    }

    #[test]
    fn aggregate_roundtrip_sorts_by_validator() {
        let input = vec![signed(3, 0x33), signed(0, 0x00), signed(2, 0x22)];
        let aggregate = aggregate_attestations(&input).unwrap();

        assert_eq!(aggregate.aggregation_bits.len(), 4);
        let pairs = disaggregate_attestation(&aggregate).unwrap();
        let ids: Vec<u64> = pairs.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 2, 3]);
        assert_eq!(pairs[0].1[0], 0x00);
        assert_eq!(pairs[1].1[0], 0x22);
        assert_eq!(pairs[2].1[0], 0x33);
    }

    #[test]
    fn aggregate_rejects_empty_input() {
        assert!(matches!(
            aggregate_attestations(&[]),
            Err(AggregationError::EmptyInput)
        ));
    }

    #[test]
    fn aggregate_rejects_mixed_data() {
        let mut other = signed(1, 0x11);
        other.message.data.slot = 9;
        let input = vec![signed(0, 0x00), other];
        assert!(matches!(
            aggregate_attestations(&input),
            Err(AggregationError::DataMismatch)
        ));
    }

    #[test]
    fn disaggregate_rejects_truncated_signatures() {
        let input = vec![signed(0, 0x00), signed(1, 0x11)];
        let mut aggregate = aggregate_attestations(&input).unwrap();
        let truncated = aggregate.aggregated_signature[..SIGNATURE_SIZE].to_vec();
        aggregate.aggregated_signature = AggregatedSignatureBytes::new(truncated).unwrap();

        assert!(matches!(
            disaggregate_attestation(&aggregate),
            Err(AggregationError::SignatureLengthMismatch { .. })
        ));
    }
}
