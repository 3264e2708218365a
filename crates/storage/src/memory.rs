use std::collections::HashMap;
use std::sync::RwLock;

use rean_types::{
    block::{Block, SignedBlockWithAttestation},
    primitives::H256,
    state::State,
};

use crate::Storage;

/// In-memory storage backed by `RwLock<HashMap>`s.
///
/// Each map has its own lock, so block reads never contend with state
/// writes. Inserting under an existing root is a no-op: content-addressed
/// entries are immutable once written.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<H256, Block>>,
    signed_blocks: RwLock<HashMap<H256, SignedBlockWithAttestation>>,
    states: RwLock<HashMap<H256, State>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn put_block(&self, root: H256, block: Block) {
        self.blocks
            .write()
            .expect("lock poisoned")
            .entry(root)
            .or_insert(block);
    }

    fn get_block(&self, root: &H256) -> Option<Block> {
        self.blocks.read().expect("lock poisoned").get(root).cloned()
    }

    fn has_block(&self, root: &H256) -> bool {
        self.blocks.read().expect("lock poisoned").contains_key(root)
    }

    fn put_signed_block(&self, root: H256, envelope: SignedBlockWithAttestation) {
        self.signed_blocks
            .write()
            .expect("lock poisoned")
            .entry(root)
            .or_insert(envelope);
    }

    fn get_signed_block(&self, root: &H256) -> Option<SignedBlockWithAttestation> {
        self.signed_blocks
            .read()
            .expect("lock poisoned")
            .get(root)
            .cloned()
    }

    fn put_state(&self, root: H256, state: State) {
        self.states
            .write()
            .expect("lock poisoned")
            .entry(root)
            .or_insert(state);
    }

    fn get_state(&self, root: &H256) -> Option<State> {
        self.states.read().expect("lock poisoned").get(root).cloned()
    }

    fn all_blocks(&self) -> HashMap<H256, Block> {
        self.blocks.read().expect("lock poisoned").clone()
    }

    fn all_states(&self) -> HashMap<H256, State> {
        self.states.read().expect("lock poisoned").clone()
    }
}
