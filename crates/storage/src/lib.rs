//! Content-addressed storage for blocks and states.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;

use rean_types::{
    block::{Block, SignedBlockWithAttestation},
    primitives::H256,
    state::State,
};

/// Content-addressed, thread-safe storage consumed by fork choice.
///
/// Blocks and states are keyed by block root, inserted once, and never
/// updated or deleted. Implementations must be safe for concurrent
/// readers and writers; each call is individually atomic.
pub trait Storage: Send + Sync {
    fn put_block(&self, root: H256, block: Block);
    fn get_block(&self, root: &H256) -> Option<Block>;
    fn has_block(&self, root: &H256) -> bool;

    fn put_signed_block(&self, root: H256, envelope: SignedBlockWithAttestation);
    fn get_signed_block(&self, root: &H256) -> Option<SignedBlockWithAttestation>;

    fn put_state(&self, root: H256, state: State);
    fn get_state(&self, root: &H256) -> Option<State>;

    /// Snapshot of all known blocks. The returned map is owned by the
    /// caller and may be mutated freely without affecting the store.
    fn all_blocks(&self) -> HashMap<H256, Block>;

    /// Snapshot of all known post-states, keyed by block root.
    fn all_states(&self) -> HashMap<H256, State>;
}
