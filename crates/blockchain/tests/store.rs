use std::sync::Arc;

use rean_blockchain::{Store, StoreError};
use rean_crypto::{AcceptAllVerifier, DigestSigner, DigestVerifier, Signer, Verifier};
use rean_state_transition::{generate_genesis, process_block, process_slots};
use rean_storage::{MemoryStore, Storage};
use rean_types::{
    INTERVALS_PER_SLOT, SECONDS_PER_SLOT,
    attestation::{Attestation, AttestationData, Attestations, SignedAttestation},
    block::{Block, BlockBody, BlockSignatures, SignedBlockWithAttestation},
    primitives::{H256, ssz::TreeHash},
    signature::Signature,
    state::{Checkpoint, State, Validator},
};

const GENESIS_TIME: u64 = 1000;

fn test_validators(n: u64) -> Vec<Validator> {
    (0..n)
        .map(|index| Validator {
            pubkey: Default::default(),
            index,
        })
        .collect()
}

fn signing_validators(n: u64) -> Vec<Validator> {
    (0..n)
        .map(|index| Validator {
            pubkey: DigestSigner::from_seed(index).public_key(),
            index,
        })
        .collect()
}

fn new_store<V: Verifier>(state: State, verifier: V) -> (Store<V>, H256) {
    let storage = Arc::new(MemoryStore::new());
    let genesis_root = rean_state_transition::genesis_block(&state).tree_hash_root();
    let store = Store::from_genesis(state, storage, verifier);
    (store, genesis_root)
}

/// Build a valid block for `slot` on top of `state` and return it with
/// its post-state.
fn build_block(state: &State, slot: u64, attestations: Vec<Attestation>) -> (Block, State) {
    let advanced = process_slots(state, slot).expect("advance");
    let mut block = Block {
        slot,
        proposer_index: slot % state.num_validators(),
        parent_root: advanced.latest_block_header.tree_hash_root(),
        state_root: H256::ZERO,
        body: BlockBody {
            attestations: Attestations::new(attestations).expect("attestation limit"),
        },
    };
    let post = process_block(&advanced, &block).expect("process block");
    block.state_root = post.tree_hash_root();
    (block, post)
}

/// Envelope with zeroed body signatures and no proposer attestation.
fn unsigned_envelope(block: &Block) -> SignedBlockWithAttestation {
    let signatures = vec![Signature::default(); block.body.attestations.len()];
    SignedBlockWithAttestation {
        message: rean_types::block::BlockWithAttestation {
            block: block.clone(),
            proposer_attestation: None.into(),
        },
        signature: BlockSignatures::new(signatures).expect("signature limit"),
    }
}

fn genesis_vote(validator_id: u64, slot: u64, genesis_root: H256) -> SignedAttestation {
    let checkpoint = Checkpoint {
        root: genesis_root,
        slot: 0,
    };
    SignedAttestation {
        message: Attestation {
            validator_id,
            data: AttestationData {
                slot,
                head: checkpoint,
                target: checkpoint,
                source: checkpoint,
            },
        },
        signature: Signature::default(),
    }
}

fn advance_to_slot<V: Verifier>(store: &Store<V>, slot: u64) {
    store.advance_time(GENESIS_TIME + slot * SECONDS_PER_SLOT, false);
}

#[test]
fn store_initializes_from_anchor() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);

    assert_eq!(store.head(), genesis_root);
    assert_eq!(store.safe_target(), genesis_root);
    assert_eq!(store.latest_justified().root, genesis_root);
    assert_eq!(store.latest_finalized().root, genesis_root);
    assert_eq!(store.time(), 0);
    assert!(store.storage().has_block(&genesis_root));
    assert!(store.storage().get_signed_block(&genesis_root).is_some());
}

#[test]
fn missing_parent_state_is_rejected() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state.clone(), AcceptAllVerifier);

    let (_block1, post1) = build_block(&state, 1, vec![]);
    let (block2, _) = build_block(&post1, 2, vec![]);

    advance_to_slot(&store, 2);
    let err = store.process_block(unsigned_envelope(&block2)).unwrap_err();
    assert!(matches!(err, StoreError::MissingParentState(_)));
}

#[test]
fn process_block_is_idempotent() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state.clone(), AcceptAllVerifier);

    let (block, _) = build_block(&state, 1, vec![]);
    advance_to_slot(&store, 1);

    store.process_block(unsigned_envelope(&block)).unwrap();
    let status_first = store.get_status();

    store.process_block(unsigned_envelope(&block)).unwrap();
    assert_eq!(store.get_status(), status_first);
}

#[test]
fn wrong_signature_count_leaves_store_unchanged() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state.clone(), AcceptAllVerifier);

    let vote = genesis_vote(0, 0, genesis_root).message;
    let (block, _) = build_block(&state, 1, vec![vote]);
    let block_root = block.tree_hash_root();

    let mut envelope = unsigned_envelope(&block);
    envelope.signature = BlockSignatures::empty(); // body has one attestation

    advance_to_slot(&store, 1);
    let status_before = store.get_status();
    let err = store.process_block(envelope).unwrap_err();

    assert!(matches!(
        err,
        StoreError::InvalidSignatureCount { got: 0, want: 1 }
    ));
    assert_eq!(store.get_status(), status_before);
    assert!(!store.storage().has_block(&block_root));
    assert!(store.storage().get_state(&block_root).is_none());
}

#[test]
fn attestation_supersede_uses_data_slot() {
    // S4: a newer-slot pending attestation is not displaced by an older one.
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);

    advance_to_slot(&store, 3);

    store.process_attestation(genesis_vote(0, 3, genesis_root));
    store.process_attestation(genesis_vote(0, 2, genesis_root));

    let pending = store.latest_new_attestation(0).expect("pending attestation");
    assert_eq!(pending.message.data.slot, 3);
}

#[test]
fn gossip_attestation_from_future_slot_is_dropped() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);

    advance_to_slot(&store, 1);
    // data.slot == current_slot + 1 passes validation but is held back
    // from the pending set until its slot starts.
    store.process_attestation(genesis_vote(0, 2, genesis_root));
    assert!(store.latest_new_attestation(0).is_none());
}

#[test]
fn attestation_with_unknown_blocks_is_dropped() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state, AcceptAllVerifier);

    advance_to_slot(&store, 1);
    store.process_attestation(genesis_vote(0, 1, H256::from([0xde; 32])));
    assert!(store.latest_new_attestation(0).is_none());
}

#[test]
fn tick_interval_accepts_pending_attestations() {
    // S6: pending votes migrate to known over one full slot of ticks.
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);

    store.process_attestation(genesis_vote(0, 0, genesis_root));
    assert!(store.latest_new_attestation(0).is_some());

    for i in 0..INTERVALS_PER_SLOT {
        store.tick_interval(i == INTERVALS_PER_SLOT - 1);
    }

    assert!(store.latest_known_attestation(0).is_some());
    assert!(store.latest_new_attestation(0).is_none());
    assert_eq!(store.time(), INTERVALS_PER_SLOT);
}

#[test]
fn advance_time_is_a_noop_before_genesis() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state, AcceptAllVerifier);

    store.advance_time(GENESIS_TIME - 1, false);
    assert_eq!(store.time(), 0);
}

#[test]
fn safe_target_stays_at_anchor_without_votes() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);

    store.update_safe_target();
    assert_eq!(store.safe_target(), genesis_root);
}

#[test]
fn reorg_to_newly_justified_fork() {
    // S5: two forks off genesis; fork B justifies its slot-2 block via
    // supermajority attestations carried in its slot-4 block.
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state.clone(), AcceptAllVerifier);

    let (block_a1, _) = build_block(&state, 1, vec![]);
    let (block_b2, post_b2) = build_block(&state, 2, vec![]);

    let source = Checkpoint {
        root: post_b2.historical_block_hashes[0],
        slot: 0,
    };
    let target = Checkpoint {
        root: post_b2.latest_block_header.tree_hash_root(),
        slot: 2,
    };
    let votes: Vec<Attestation> = (0..4)
        .map(|validator_id| Attestation {
            validator_id,
            data: AttestationData {
                slot: 3,
                head: target,
                target,
                source,
            },
        })
        .collect();
    let (block_b4, _) = build_block(&post_b2, 4, votes);

    advance_to_slot(&store, 1);
    store.process_block(unsigned_envelope(&block_a1)).unwrap();
    assert_eq!(store.head(), block_a1.tree_hash_root());

    advance_to_slot(&store, 2);
    store.process_block(unsigned_envelope(&block_b2)).unwrap();
    let justified_after_b2 = store.latest_justified().slot;

    advance_to_slot(&store, 4);
    store.process_block(unsigned_envelope(&block_b4)).unwrap();

    assert_eq!(store.head(), block_b4.tree_hash_root());
    assert_eq!(store.latest_justified().slot, 2);
    assert_eq!(store.latest_justified().root, target.root);
    assert!(store.latest_justified().slot >= justified_after_b2);
    assert_eq!(store.latest_finalized().slot, 0);
}

#[test]
fn checkpoints_are_monotonic_across_forks() {
    let state = generate_genesis(GENESIS_TIME, test_validators(5));
    let (store, _) = new_store(state.clone(), AcceptAllVerifier);

    // A chain justifying as it goes (same shape as the S5 fixture).
    let (block_b2, post_b2) = build_block(&state, 2, vec![]);
    let source = Checkpoint {
        root: post_b2.historical_block_hashes[0],
        slot: 0,
    };
    let target = Checkpoint {
        root: post_b2.latest_block_header.tree_hash_root(),
        slot: 2,
    };
    let votes: Vec<Attestation> = (0..4)
        .map(|validator_id| Attestation {
            validator_id,
            data: AttestationData {
                slot: 3,
                head: target,
                target,
                source,
            },
        })
        .collect();
    let (block_b4, _) = build_block(&post_b2, 4, votes);

    // A competing empty fork arriving late must not regress checkpoints.
    let (block_a1, _) = build_block(&state, 1, vec![]);

    advance_to_slot(&store, 4);
    store.process_block(unsigned_envelope(&block_b2)).unwrap();
    store.process_block(unsigned_envelope(&block_b4)).unwrap();
    assert_eq!(store.latest_justified().slot, 2);

    store.process_block(unsigned_envelope(&block_a1)).unwrap();
    assert_eq!(store.latest_justified().slot, 2);
    assert_eq!(store.latest_finalized().slot, 0);
}

#[test]
fn produced_block_is_accepted_by_a_fresh_store() {
    let validators = signing_validators(5);
    let state = generate_genesis(GENESIS_TIME, validators.clone());
    let (producer, _) = new_store(state.clone(), DigestVerifier);

    // Validator 0 votes at slot 1, then validator 1 proposes for slot 1
    // and packs the vote into the block.
    let signer0 = DigestSigner::from_seed(0);
    let attestation = producer.produce_attestation(1, 0, &signer0).unwrap();
    producer.process_attestation(attestation.clone());
    assert!(producer.latest_new_attestation(0).is_some());

    let signer1 = DigestSigner::from_seed(1);
    let envelope = producer.produce_block(1, 1, &signer1).unwrap();

    assert_eq!(envelope.message.block.slot, 1);
    assert_eq!(envelope.message.block.body.attestations.len(), 1);
    assert_eq!(envelope.signature.len(), 2);
    assert!(envelope.message.proposer_attestation.is_some());

    let block_root = envelope.message.block.tree_hash_root();
    assert!(producer.storage().has_block(&block_root));
    assert!(producer.storage().get_state(&block_root).is_some());

    // A fresh store replays the envelope, signatures and all.
    let (follower, _) = new_store(state, DigestVerifier);
    advance_to_slot(&follower, 1);
    follower.process_block(envelope.clone()).unwrap();

    assert_eq!(follower.head(), block_root);
    // The proposer's own attestation lands in the pending set.
    let pending = follower.latest_new_attestation(1).expect("proposer vote");
    assert_eq!(pending.message.data.head.root, block_root);
    // The packed body vote becomes a known on-chain attestation.
    assert!(follower.latest_known_attestation(0).is_some());
}

#[test]
fn produce_block_rejects_wrong_proposer() {
    let state = generate_genesis(GENESIS_TIME, signing_validators(5));
    let (store, _) = new_store(state, DigestVerifier);

    let signer0 = DigestSigner::from_seed(0);
    let err = store.produce_block(1, 0, &signer0).unwrap_err();
    assert!(matches!(err, StoreError::NotProposer { .. }));
}

#[test]
fn tampered_body_signature_rejects_whole_block() {
    let validators = signing_validators(5);
    let state = generate_genesis(GENESIS_TIME, validators);
    let (producer, _) = new_store(state.clone(), DigestVerifier);

    let signer0 = DigestSigner::from_seed(0);
    let attestation = producer.produce_attestation(1, 0, &signer0).unwrap();
    producer.process_attestation(attestation);

    let signer1 = DigestSigner::from_seed(1);
    let mut envelope = producer.produce_block(1, 1, &signer1).unwrap();

    let mut signatures: Vec<Signature> = envelope.signature.iter().cloned().collect();
    signatures[0] = Signature::default();
    envelope.signature = BlockSignatures::new(signatures).unwrap();

    let (follower, genesis_root) = new_store(state, DigestVerifier);
    advance_to_slot(&follower, 1);
    let err = follower.process_block(envelope).unwrap_err();

    assert!(matches!(err, StoreError::SignatureInvalid { validator: 0 }));
    assert_eq!(follower.head(), genesis_root);
}

#[test]
fn produce_attestation_votes_for_current_head() {
    let state = generate_genesis(GENESIS_TIME, signing_validators(5));
    let (store, genesis_root) = new_store(state, DigestVerifier);

    let signer2 = DigestSigner::from_seed(2);
    let attestation = store.produce_attestation(2, 2, &signer2).unwrap();

    assert_eq!(attestation.message.validator_id, 2);
    assert_eq!(attestation.message.data.slot, 2);
    assert_eq!(attestation.message.data.head.root, genesis_root);
    assert_eq!(attestation.message.data.source.root, genesis_root);
    assert_eq!(attestation.message.data.target.root, genesis_root);

    // The signature verifies under the validator's registered key.
    let message = attestation.message.tree_hash_root();
    DigestVerifier
        .verify(&signer2.public_key(), 2, &message, &attestation.signature)
        .unwrap();
}

#[test]
fn concurrent_gossip_and_status_reads() {
    let state = generate_genesis(GENESIS_TIME, test_validators(8));
    let (store, genesis_root) = new_store(state, AcceptAllVerifier);
    let store = Arc::new(store);

    advance_to_slot(&store, 2);

    let mut handles = Vec::new();
    for validator in 0..8u64 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            for slot in 0..=2 {
                store.process_attestation(genesis_vote(validator, slot, genesis_root));
                let status = store.get_status();
                assert!(status.finalized_slot <= status.justified_slot);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for validator in 0..8u64 {
        let pending = store.latest_new_attestation(validator).expect("vote kept");
        assert_eq!(pending.message.data.slot, 2);
    }
}
