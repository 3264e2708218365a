//! Block and attestation production for validators assigned to this node.

use rean_crypto::{Signer, Verifier};
use rean_state_transition::{is_proposer, process_block, process_slots};
use rean_storage::Storage;
use rean_types::{
    SECONDS_PER_SLOT, ShortRoot,
    attestation::{Attestation, AttestationData, Attestations, SignedAttestation},
    block::{
        Block, BlockBody, BlockSignatures, BlockWithAttestation, OptionalAttestation,
        SignedBlockWithAttestation,
    },
    primitives::{H256, ssz::TreeHash},
    signature::Signature,
    state::Checkpoint,
};
use tracing::info;

use crate::{Store, StoreError};

impl<V: Verifier> Store<V> {
    /// Produce a signed block for `slot` on behalf of `validator_index`.
    ///
    /// Collects eligible known attestations to a fixed point: each pass
    /// applies the candidate block, then admits every known attestation
    /// whose source matches the post-state's justified checkpoint and
    /// whose head block is available, until no new attestation qualifies.
    ///
    /// The envelope carries body attestation signatures in body order and
    /// the proposer signature last. If signing fails, nothing is stored.
    pub fn produce_block(
        &self,
        slot: u64,
        validator_index: u64,
        signer: &dyn Signer,
    ) -> Result<SignedBlockWithAttestation, StoreError> {
        let mut inner = self.lock_inner();

        if !is_proposer(validator_index, slot, inner.config.num_validators) {
            return Err(StoreError::NotProposer {
                validator: validator_index,
                slot,
            });
        }

        // Advance to the slot boundary and activate pending votes; the
        // resulting head is the proposal parent.
        let slot_time = inner.config.genesis_time + slot * SECONDS_PER_SLOT;
        inner.advance_time(slot_time, true);
        inner.accept_new_attestations();
        let head_root = inner.head;

        let head_state = inner
            .storage
            .get_state(&head_root)
            .ok_or(StoreError::MissingParentState(head_root))?;
        let advanced = process_slots(&head_state, slot)?;

        let mut attestations: Vec<Attestation> = Vec::new();
        let mut signatures: Vec<Signature> = Vec::new();

        // Fixed-point attestation collection.
        let (mut block, final_state) = loop {
            let candidate = Block {
                slot,
                proposer_index: validator_index,
                parent_root: head_root,
                state_root: H256::ZERO,
                body: BlockBody {
                    attestations: Attestations::new(attestations.clone())
                        .expect("attestation limit exceeded"),
                },
            };
            let post_state = process_block(&advanced, &candidate)?;

            let mut admitted: Vec<&SignedAttestation> = inner
                .latest_known_attestations
                .values()
                .filter(|known| {
                    let data = &known.message.data;
                    inner.storage.has_block(&data.head.root)
                        && data.source == post_state.latest_justified
                        && !attestations.iter().any(|included| {
                            included.validator_id == known.message.validator_id
                                && included.data.slot == data.slot
                        })
                })
                .collect();

            if admitted.is_empty() {
                break (candidate, post_state);
            }

            // Map iteration order is arbitrary; sort for a deterministic body.
            admitted.sort_by_key(|signed| signed.message.validator_id);
            for signed in admitted {
                attestations.push(signed.message.clone());
                signatures.push(signed.signature.clone());
            }
        };

        block.state_root = final_state.tree_hash_root();
        let block_root = block.tree_hash_root();

        let proposer_attestation = Attestation {
            validator_id: validator_index,
            data: AttestationData {
                slot,
                head: Checkpoint {
                    root: block_root,
                    slot,
                },
                target: inner.get_vote_target(),
                source: inner.latest_justified,
            },
        };

        // Sign before storing anything: a failed signature means the
        // envelope is never observed.
        let message = proposer_attestation.tree_hash_root();
        let proposer_signature = signer.sign(slot as u32, &message)?;
        signatures.push(proposer_signature);

        let envelope = SignedBlockWithAttestation {
            message: BlockWithAttestation {
                block: block.clone(),
                proposer_attestation: OptionalAttestation(Some(proposer_attestation)),
            },
            signature: BlockSignatures::new(signatures).expect("signature limit exceeded"),
        };

        inner.storage.put_block(block_root, block);
        inner.storage.put_signed_block(block_root, envelope.clone());
        inner.storage.put_state(block_root, final_state);

        info!(
            slot,
            proposer = validator_index,
            block_root = %ShortRoot(&block_root),
            attestations = envelope.message.block.body.attestations.len(),
            "Produced block"
        );

        Ok(envelope)
    }

    /// Produce a signed attestation for `slot` on behalf of `validator_index`.
    pub fn produce_attestation(
        &self,
        slot: u64,
        validator_index: u64,
        signer: &dyn Signer,
    ) -> Result<SignedAttestation, StoreError> {
        let mut inner = self.lock_inner();

        // Advance to the slot boundary and activate pending votes before
        // choosing what to vote for.
        let slot_time = inner.config.genesis_time + slot * SECONDS_PER_SLOT;
        inner.advance_time(slot_time, true);
        inner.accept_new_attestations();

        let head_root = inner.head;
        let head_block = inner
            .storage
            .get_block(&head_root)
            .ok_or(StoreError::MissingBlock(head_root))?;

        let attestation = Attestation {
            validator_id: validator_index,
            data: AttestationData {
                slot,
                head: Checkpoint {
                    root: head_root,
                    slot: head_block.slot,
                },
                target: inner.get_vote_target(),
                source: inner.latest_justified,
            },
        };

        let message = attestation.tree_hash_root();
        let signature = signer.sign(slot as u32, &message)?;

        Ok(SignedAttestation {
            message: attestation,
            signature,
        })
    }
}
