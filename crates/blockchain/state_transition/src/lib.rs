//! Pure state transition for the lean consensus chain.
//!
//! Every function here consumes a state by reference and returns a fresh
//! one; inputs are never mutated. Signature verification happens outside,
//! in fork choice, before blocks reach this crate.

use std::collections::HashMap;
use std::time::Instant;

use rean_types::{
    attestation::Attestation,
    block::{Block, BlockHeader},
    is_justifiable_after,
    primitives::{H256, ssz::TreeHash},
    state::{JustificationRoots, JustificationValidators, State},
};

pub mod bitlist;
mod genesis;
pub mod metrics;

pub use genesis::{generate_genesis, genesis_block};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("target slot {target_slot} is not after current slot {current_slot}")]
    InvalidSlotOrder { target_slot: u64, current_slot: u64 },
    #[error("block slot {block_slot} does not match state slot {state_slot}")]
    SlotNotMatching { state_slot: u64, block_slot: u64 },
    #[error("block slot {block_slot} is not after latest header slot {parent_slot}")]
    NonIncreasingSlot { parent_slot: u64, block_slot: u64 },
    #[error("wrong proposer: expected {expected}, found {found}")]
    WrongProposer { expected: u64, found: u64 },
    #[error("parent root mismatch: expected {expected}, found {found}")]
    WrongParentRoot { expected: H256, found: H256 },
    #[error("state root mismatch: expected {expected}, found {found}")]
    InvalidStateRoot { expected: H256, found: H256 },
}

/// Determine the proposer for a given slot.
///
/// Round-robin over the fixed registry. Panics if the registry is empty.
pub fn current_proposer(slot: u64, num_validators: u64) -> u64 {
    slot % num_validators
}

/// Whether `validator_index` proposes at `slot`.
pub fn is_proposer(validator_index: u64, slot: u64, num_validators: u64) -> bool {
    current_proposer(slot, num_validators) == validator_index
}

/// Per-slot maintenance: cache the state root into the latest block
/// header if it is still zero from block processing.
pub fn process_slot(state: &State) -> State {
    let mut out = state.clone();
    if out.latest_block_header.state_root == H256::ZERO {
        out.latest_block_header.state_root = state.tree_hash_root();
    }
    out
}

/// Advance the state through empty slots up to `target_slot`.
pub fn process_slots(state: &State, target_slot: u64) -> Result<State, Error> {
    if state.slot >= target_slot {
        return Err(Error::InvalidSlotOrder {
            target_slot,
            current_slot: state.slot,
        });
    }
    metrics::inc_slots_processed(target_slot - state.slot);

    let mut s = state.clone();
    while s.slot < target_slot {
        s = process_slot(&s);
        s.slot += 1;
    }
    Ok(s)
}

/// Validate the block header and update header-linked state.
pub fn process_block_header(state: &State, block: &Block) -> Result<State, Error> {
    let parent_header = &state.latest_block_header;

    // Validation

    if block.slot != state.slot {
        return Err(Error::SlotNotMatching {
            state_slot: state.slot,
            block_slot: block.slot,
        });
    }
    if block.slot <= parent_header.slot {
        return Err(Error::NonIncreasingSlot {
            parent_slot: parent_header.slot,
            block_slot: block.slot,
        });
    }
    let expected_proposer = current_proposer(block.slot, state.num_validators());
    if block.proposer_index != expected_proposer {
        return Err(Error::WrongProposer {
            expected: expected_proposer,
            found: block.proposer_index,
        });
    }
    let expected_parent = parent_header.tree_hash_root();
    if block.parent_root != expected_parent {
        return Err(Error::WrongParentRoot {
            expected: expected_parent,
            found: block.parent_root,
        });
    }

    // State updates

    let mut out = state.clone();
    let parent_root = block.parent_root;

    // First block after genesis: promote the anchor into both checkpoints,
    // keeping their slots.
    let is_genesis_parent = parent_header.slot == 0;
    if is_genesis_parent {
        out.latest_justified.root = parent_root;
        out.latest_finalized.root = parent_root;
    }

    out.historical_block_hashes
        .push(parent_root)
        .expect("historical roots limit exceeded");
    out.justified_slots = bitlist::append(&out.justified_slots, is_genesis_parent);

    // Fill the gap left by empty slots between parent and this block.
    let num_empty = block.slot - parent_header.slot - 1;
    for _ in 0..num_empty {
        out.historical_block_hashes
            .push(H256::ZERO)
            .expect("historical roots limit exceeded");
        out.justified_slots = bitlist::append(&out.justified_slots, false);
    }

    out.latest_block_header = BlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        body_root: block.body.tree_hash_root(),
        // Zeroed until the next slot advance caches the post-state root.
        state_root: H256::ZERO,
    };
    Ok(out)
}

/// Apply attestation votes and update justification/finalization
/// according to the 3SF-mini rules.
///
/// Per-validator votes are tracked via `justifications_roots` (sorted
/// list of block roots being voted on) and `justifications_validators`
/// (flat bitlist where each root's validator votes are packed
/// consecutively).
pub fn process_attestations(state: &State, attestations: &[Attestation]) -> State {
    let start = Instant::now();
    let num_validators = state.num_validators();

    // Deserialize justifications from SSZ form into a working map.
    let mut justifications: HashMap<H256, Vec<bool>> = HashMap::new();
    for (i, root) in state.justifications_roots.iter().enumerate() {
        let votes = (0..num_validators)
            .map(|v| {
                let bit = i as u64 * num_validators + v;
                bitlist::get(&state.justifications_validators, bit as usize)
            })
            .collect();
        justifications.insert(*root, votes);
    }

    let mut justified_slots = state.justified_slots.clone();
    let mut latest_justified = state.latest_justified;
    let mut latest_finalized = state.latest_finalized;
    // Justifiability is judged against the finalized slot frozen at entry.
    let finalized_slot = state.latest_finalized.slot;

    for attestation in attestations {
        let source = attestation.data.source;
        let target = attestation.data.target;

        // Target must be after source (strict).
        if target.slot <= source.slot {
            continue;
        }

        // Source must be justified.
        if source.slot as usize >= justified_slots.len()
            || !bitlist::get(&justified_slots, source.slot as usize)
        {
            continue;
        }

        // Target must not already be justified.
        if (target.slot as usize) < justified_slots.len()
            && bitlist::get(&justified_slots, target.slot as usize)
        {
            continue;
        }

        // Source and target roots must match historical block hashes.
        if state
            .historical_block_hashes
            .get(source.slot as usize)
            .is_none_or(|root| *root != source.root)
        {
            continue;
        }
        if state
            .historical_block_hashes
            .get(target.slot as usize)
            .is_none_or(|root| *root != target.root)
        {
            continue;
        }

        if !is_justifiable_after(target.slot, finalized_slot) {
            continue;
        }

        let validator_id = attestation.validator_id;
        if validator_id >= num_validators {
            continue;
        }

        // Record the vote (idempotent: a repeated vote is skipped).
        let votes = justifications
            .entry(target.root)
            .or_insert_with(|| vec![false; num_validators as usize]);
        if votes[validator_id as usize] {
            continue;
        }
        votes[validator_id as usize] = true;

        let count = votes.iter().filter(|voted| **voted).count() as u64;
        if 3 * count < 2 * num_validators {
            continue;
        }

        // Supermajority reached: justify the target.
        latest_justified = target;
        while justified_slots.len() <= target.slot as usize {
            justified_slots = bitlist::append(&justified_slots, false);
        }
        bitlist::set(&mut justified_slots, target.slot as usize, true);
        justifications.remove(&target.root);

        // Finalize the source iff no justifiable slot sits strictly
        // between source and target.
        let has_justifiable_gap =
            (source.slot + 1..target.slot).any(|s| is_justifiable_after(s, finalized_slot));
        if has_justifiable_gap {
            metrics::inc_finalizations("skipped");
        } else {
            latest_finalized = source;
            metrics::inc_finalizations("finalized");
        }
    }

    let (justifications_roots, justifications_validators) =
        pack_justifications(&justifications, num_validators);

    let mut out = state.clone();
    out.justified_slots = justified_slots;
    out.latest_justified = latest_justified;
    out.latest_finalized = latest_finalized;
    out.justifications_roots = justifications_roots;
    out.justifications_validators = justifications_validators;

    metrics::inc_attestations_processed(attestations.len() as u64);
    metrics::observe_attestations_processing_time(start.elapsed().as_secs_f64());
    out
}

/// Serialize the working justification map back to its SSZ form: roots
/// in lexicographic order, `num_validators` bits packed per root.
fn pack_justifications(
    justifications: &HashMap<H256, Vec<bool>>,
    num_validators: u64,
) -> (JustificationRoots, JustificationValidators) {
    let mut roots: Vec<H256> = justifications.keys().copied().collect();
    roots.sort();

    let total_bits = roots.len() * num_validators as usize;
    let mut bits =
        JustificationValidators::with_capacity(total_bits).expect("justification limit exceeded");
    for (i, root) in roots.iter().enumerate() {
        for (v, voted) in justifications[root].iter().enumerate() {
            if *voted {
                bits.set(i * num_validators as usize + v, true)
                    .expect("index within capacity");
            }
        }
    }

    let roots = JustificationRoots::new(roots).expect("justification roots limit exceeded");
    (roots, bits)
}

/// Apply full block processing: header, then body attestations.
pub fn process_block(state: &State, block: &Block) -> Result<State, Error> {
    let start = Instant::now();
    let s = process_block_header(state, block)?;
    let s = process_attestations(&s, &block.body.attestations);
    metrics::observe_block_processing_time(start.elapsed().as_secs_f64());
    Ok(s)
}

/// The complete state transition for a block, including the state root
/// check. Signature verification must happen before calling this.
pub fn state_transition(state: &State, block: &Block) -> Result<State, Error> {
    let start = Instant::now();

    let s = process_slots(state, block.slot)?;
    let s = process_block(&s, block)?;

    let computed = s.tree_hash_root();
    if block.state_root != computed {
        return Err(Error::InvalidStateRoot {
            expected: computed,
            found: block.state_root,
        });
    }

    metrics::observe_state_transition_time(start.elapsed().as_secs_f64());
    Ok(s)
}
