//! Inbound message handlers: the seam between wire codecs and the
//! fork-choice store.
//!
//! A gossip/req-resp transport delivers raw payloads here; everything
//! protocol-level (decode, validate, store) happens on this side so the
//! transport stays a dumb pipe.

use std::sync::Arc;

use rean_blockchain::Store;
use rean_crypto::Verifier;
use rean_storage::Storage;
use rean_types::{ShortRoot, primitives::H256};
use rean_wire::reqresp::{RESPONSE_RESOURCE_UNAVAILABLE, RESPONSE_SUCCESS, Status};
use tracing::{info, warn};

pub struct Handler<V: Verifier> {
    store: Arc<Store<V>>,
}

impl<V: Verifier> Handler<V> {
    pub fn new(store: Arc<Store<V>>) -> Self {
        Self { store }
    }

    /// Handle a block topic payload.
    pub fn on_block_message(&self, data: &[u8]) {
        let envelope = match rean_wire::gossip::decode_block(data) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "Undecodable gossip block");
                return;
            }
        };

        let slot = envelope.message.block.slot;
        info!(slot, "Received block via gossip");
        if let Err(err) = self.store.process_block(envelope) {
            warn!(slot, %err, "Rejected gossip block");
        }
    }

    /// Handle an attestation topic payload.
    pub fn on_attestation_message(&self, data: &[u8]) {
        match rean_wire::gossip::decode_attestation(data) {
            Ok(attestation) => self.store.process_attestation(attestation),
            Err(err) => warn!(%err, "Undecodable gossip attestation"),
        }
    }

    /// Handle an aggregate attestation topic payload.
    pub fn on_aggregate_message(&self, data: &[u8]) {
        match rean_wire::gossip::decode_aggregated_attestation(data) {
            Ok(aggregate) => self.store.process_aggregated_attestation(&aggregate),
            Err(err) => warn!(%err, "Undecodable aggregate attestation"),
        }
    }

    /// Serve a status request from the current chain view.
    pub fn on_status_request(&self, peer_status: &Status) -> Status {
        let status = self.store.get_status();
        info!(
            peer_head = peer_status.head.slot,
            peer_finalized = peer_status.finalized.slot,
            head = status.head_slot,
            "Status exchange"
        );
        Status {
            finalized: rean_types::state::Checkpoint {
                root: status.finalized_root,
                slot: status.finalized_slot,
            },
            head: rean_types::state::Checkpoint {
                root: status.head,
                slot: status.head_slot,
            },
        }
    }

    /// Serve a blocks-by-root request, writing one chunk per root.
    pub fn on_blocks_by_root_request<W: std::io::Write>(
        &self,
        roots: &[H256],
        writer: &mut W,
    ) -> Result<(), rean_wire::WireError> {
        let storage = self.store.storage();
        for root in roots {
            match storage.get_signed_block(root) {
                Some(envelope) => {
                    rean_wire::reqresp::write_block_chunk(writer, RESPONSE_SUCCESS, Some(&envelope))?;
                }
                None => {
                    warn!(root = %ShortRoot(root), "Requested block not found");
                    rean_wire::reqresp::write_block_chunk(
                        writer,
                        RESPONSE_RESOURCE_UNAVAILABLE,
                        None,
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rean_blockchain::Store;
    use rean_crypto::AcceptAllVerifier;
    use rean_state_transition::{generate_genesis, genesis_block};
    use rean_storage::MemoryStore;
    use rean_types::{
        attestation::{Attestation, AttestationData, SignedAttestation},
        primitives::ssz::TreeHash,
        state::{Checkpoint, Validator},
    };

    fn test_store() -> (Arc<Store<AcceptAllVerifier>>, H256) {
        let validators: Vec<Validator> = (0..5)
            .map(|index| Validator {
                pubkey: Default::default(),
                index,
            })
            .collect();
        let state = generate_genesis(1000, validators);
        let genesis_root = genesis_block(&state).tree_hash_root();
        let store = Store::from_genesis(state, Arc::new(MemoryStore::new()), AcceptAllVerifier);
        (Arc::new(store), genesis_root)
    }

    #[test]
    fn attestation_message_reaches_the_store() {
        let (store, genesis_root) = test_store();
        let handler = Handler::new(Arc::clone(&store));

        let checkpoint = Checkpoint {
            root: genesis_root,
            slot: 0,
        };
        let attestation = SignedAttestation {
            message: Attestation {
                validator_id: 3,
                data: AttestationData {
                    slot: 0,
                    head: checkpoint,
                    target: checkpoint,
                    source: checkpoint,
                },
            },
            signature: Default::default(),
        };

        handler.on_attestation_message(&rean_wire::gossip::encode_attestation(&attestation));
        assert!(store.latest_new_attestation(3).is_some());
    }

    #[test]
    fn undecodable_messages_are_dropped() {
        let (store, _) = test_store();
        let handler = Handler::new(store);
        handler.on_block_message(b"junk");
        handler.on_attestation_message(b"junk");
        handler.on_aggregate_message(b"junk");
    }

    #[test]
    fn status_request_reflects_chain_view() {
        let (store, genesis_root) = test_store();
        let handler = Handler::new(store);

        let peer = Status {
            finalized: Checkpoint {
                root: H256::ZERO,
                slot: 0,
            },
            head: Checkpoint {
                root: H256::ZERO,
                slot: 0,
            },
        };
        let status = handler.on_status_request(&peer);
        assert_eq!(status.head.root, genesis_root);
        assert_eq!(status.finalized.root, genesis_root);
    }

    #[test]
    fn blocks_by_root_serves_known_and_flags_missing() {
        let (store, genesis_root) = test_store();
        let handler = Handler::new(store);

        let mut buf = Vec::new();
        handler
            .on_blocks_by_root_request(&[genesis_root, H256::from([0xfe; 32])], &mut buf)
            .unwrap();

        let mut reader = buf.as_slice();
        assert_eq!(
            rean_wire::reqresp::read_response_code(&mut reader).unwrap(),
            RESPONSE_SUCCESS
        );
        let block = rean_wire::reqresp::read_block(&mut reader).unwrap();
        assert_eq!(block.message.block.slot, 0);
        assert_eq!(
            rean_wire::reqresp::read_response_code(&mut reader).unwrap(),
            RESPONSE_RESOURCE_UNAVAILABLE
        );
    }
}
