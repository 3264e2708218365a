use rean_types::{
    block::{Block, BlockBody, BlockHeader},
    primitives::{H256, VariableList, ssz::TreeHash},
    state::{
        Checkpoint, Config, JustificationValidators, JustifiedSlots, State, Validator, Validators,
    },
};

/// Builds the genesis state for a fixed validator registry.
pub fn generate_genesis(genesis_time: u64, validators: Vec<Validator>) -> State {
    let config = Config {
        num_validators: validators.len() as u64,
        genesis_time,
    };

    let genesis_header = BlockHeader {
        slot: 0,
        proposer_index: 0,
        parent_root: H256::ZERO,
        state_root: H256::ZERO,
        body_root: BlockBody::default().tree_hash_root(),
    };

    State {
        config,
        slot: 0,
        latest_block_header: genesis_header,
        latest_justified: Checkpoint {
            root: H256::ZERO,
            slot: 0,
        },
        latest_finalized: Checkpoint {
            root: H256::ZERO,
            slot: 0,
        },
        historical_block_hashes: VariableList::empty(),
        justified_slots: JustifiedSlots::with_capacity(0).expect("empty bitlist"),
        validators: Validators::new(validators).expect("validator registry limit exceeded"),
        justifications_roots: VariableList::empty(),
        justifications_validators: JustificationValidators::with_capacity(0)
            .expect("empty bitlist"),
    }
}

/// The block recorded alongside the genesis state.
///
/// The state is hashed while its header still carries a zero state root,
/// and the resulting root is written into the block. Skipping that order
/// produces an anchor root no peer will recognize.
pub fn genesis_block(genesis_state: &State) -> Block {
    Block {
        slot: 0,
        proposer_index: 0,
        parent_root: H256::ZERO,
        state_root: genesis_state.tree_hash_root(),
        body: BlockBody::default(),
    }
}
