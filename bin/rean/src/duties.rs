//! Proposer, attester, and aggregation duties for assigned validators.

use std::collections::HashMap;
use std::sync::Arc;

use rean_blockchain::{Store, aggregate_attestations};
use rean_crypto::{DigestSigner, Verifier};
use rean_state_transition::is_proposer;
use rean_types::{
    ShortRoot,
    attestation::{AggregatedAttestation, SignedAttestation},
    block::SignedBlockWithAttestation,
    primitives::ssz::TreeHash,
};
use tracing::{debug, error, info};

use crate::handler::Handler;

/// Encodes outbound payloads for their gossip topics.
///
/// Encoded payloads are delivered back through the local [`Handler`]
/// the way gossipsub self-delivery would, so produced votes count even
/// without peers. A pubsub transport plugs in beside the loopback
/// without touching the core.
pub struct Publisher<V: Verifier> {
    devnet_id: String,
    loopback: Arc<Handler<V>>,
}

impl<V: Verifier> Publisher<V> {
    pub fn new(devnet_id: String, loopback: Arc<Handler<V>>) -> Self {
        Self {
            devnet_id,
            loopback,
        }
    }

    pub fn publish_block(&self, envelope: &SignedBlockWithAttestation) {
        let data = rean_wire::gossip::encode_block(envelope);
        debug!(
            topic = %rean_wire::gossip::block_topic(&self.devnet_id),
            bytes = data.len(),
            "Published block"
        );
        self.loopback.on_block_message(&data);
    }

    pub fn publish_attestation(&self, attestation: &SignedAttestation) {
        let data = rean_wire::gossip::encode_attestation(attestation);
        debug!(
            topic = %rean_wire::gossip::attestation_topic(&self.devnet_id),
            bytes = data.len(),
            "Published attestation"
        );
        self.loopback.on_attestation_message(&data);
    }

    pub fn publish_aggregate(&self, aggregate: &AggregatedAttestation) {
        let data = rean_wire::gossip::encode_aggregated_attestation(aggregate);
        debug!(
            topic = %rean_wire::gossip::aggregate_attestation_topic(&self.devnet_id),
            bytes = data.len(),
            "Published aggregate"
        );
        self.loopback.on_aggregate_message(&data);
    }
}

/// Executes validator duties against the fork-choice store.
pub struct Duties<V: Verifier> {
    indices: Vec<u64>,
    signers: HashMap<u64, DigestSigner>,
    store: Arc<Store<V>>,
    publisher: Publisher<V>,

    /// Attestations signed during interval 1, aggregated in interval 2.
    pending_attestations: Vec<SignedAttestation>,
}

impl<V: Verifier> Duties<V> {
    pub fn new(
        indices: Vec<u64>,
        signers: HashMap<u64, DigestSigner>,
        store: Arc<Store<V>>,
        publisher: Publisher<V>,
    ) -> Self {
        Self {
            indices,
            signers,
            store,
            publisher,
            pending_attestations: Vec::new(),
        }
    }

    /// Whether this node proposes at `slot`.
    pub fn has_proposal(&self, slot: u64) -> bool {
        let num_validators = self.store.num_validators();
        self.indices
            .iter()
            .any(|index| is_proposer(*index, slot, num_validators))
    }

    /// Execute the duty for the current interval.
    pub fn on_interval(&mut self, slot: u64, interval: u64) {
        match interval {
            0 => self.try_propose(slot),
            1 => self.try_attest(slot),
            2 => self.try_aggregate(slot),
            _ => {}
        }
    }

    fn try_propose(&mut self, slot: u64) {
        // Slot 0 is the anchor slot and never gets a proposal.
        if slot == 0 {
            return;
        }
        let num_validators = self.store.num_validators();

        for index in &self.indices {
            if !is_proposer(*index, slot, num_validators) {
                continue;
            }
            let Some(signer) = self.signers.get(index) else {
                error!(validator = *index, "proposer key not found");
                continue;
            };

            match self.store.produce_block(slot, *index, signer) {
                Ok(envelope) => {
                    let block_root = envelope.message.block.tree_hash_root();
                    self.publisher.publish_block(&envelope);
                    info!(
                        slot,
                        proposer = *index,
                        block_root = %ShortRoot(&block_root),
                        "Proposed block"
                    );
                }
                Err(err) => {
                    error!(slot, proposer = *index, %err, "Block proposal failed");
                }
            }
        }
    }

    fn try_attest(&mut self, slot: u64) {
        self.pending_attestations.clear();
        let num_validators = self.store.num_validators();

        for index in &self.indices {
            // The proposer already attests via its block's proposer
            // attestation.
            if is_proposer(*index, slot, num_validators) {
                continue;
            }
            let Some(signer) = self.signers.get(index) else {
                error!(validator = *index, "validator key not found");
                continue;
            };

            match self.store.produce_attestation(slot, *index, signer) {
                Ok(attestation) => {
                    // Loopback delivery counts the vote locally.
                    self.publisher.publish_attestation(&attestation);
                    self.pending_attestations.push(attestation);
                    debug!(slot, validator = *index, "Published attestation");
                }
                Err(err) => {
                    error!(slot, validator = *index, %err, "Attestation failed");
                }
            }
        }
    }

    fn try_aggregate(&mut self, slot: u64) {
        if self.pending_attestations.is_empty() {
            return;
        }

        match aggregate_attestations(&self.pending_attestations) {
            Ok(aggregate) => {
                info!(
                    slot,
                    attestations = self.pending_attestations.len(),
                    aggregate_bytes = aggregate.aggregated_signature.len(),
                    "Aggregated attestations"
                );
                self.publisher.publish_aggregate(&aggregate);
            }
            Err(err) => {
                error!(
                    slot,
                    attestations = self.pending_attestations.len(),
                    %err,
                    "Aggregation failed"
                );
            }
        }

        self.pending_attestations.clear();
    }
}
