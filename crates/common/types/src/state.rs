use ssz_derive::{Decode, Encode};
use ssz_types::typenum::{U4096, U262144, U1073741824};
use tree_hash_derive::TreeHash;

use crate::{
    block::BlockHeader,
    primitives::{BitList, H256, VariableList},
    signature::Pubkey,
};

/// Maximum number of historical block roots tracked by the state (2^18).
pub type HistoricalRootsLimit = U262144;

/// Maximum number of validators in the registry (2^12).
pub type ValidatorRegistryLimit = U4096;

/// Maximum number of packed justification vote bits (2^30).
pub type JustificationValidatorsLimit = U1073741824;

pub type HistoricalBlockHashes = VariableList<H256, HistoricalRootsLimit>;
pub type JustifiedSlots = BitList<HistoricalRootsLimit>;
pub type Validators = VariableList<Validator, ValidatorRegistryLimit>;
pub type JustificationRoots = VariableList<H256, HistoricalRootsLimit>;
pub type JustificationValidators = BitList<JustificationValidatorsLimit>;

/// Chain configuration parameters fixed at genesis.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Config {
    /// Size of the validator registry, fixed for the lifetime of the chain.
    pub num_validators: u64,
    /// Genesis time as unix seconds.
    pub genesis_time: u64,
}

/// A (block root, slot) pair identifying a point on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TreeHash)]
pub struct Checkpoint {
    pub root: H256,
    pub slot: u64,
}

/// An entry in the validator registry.
///
/// The registry is fixed at genesis and indexed by position; `index`
/// always equals the validator's offset in `State::validators`.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Validator {
    pub pubkey: Pubkey,
    pub index: u64,
}

/// The main consensus state object.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct State {
    /// The chain's configuration parameters
    pub config: Config,
    /// The current slot number
    pub slot: u64,
    /// The header of the most recent block
    pub latest_block_header: BlockHeader,
    /// The latest justified checkpoint
    pub latest_justified: Checkpoint,
    /// The latest finalized checkpoint
    pub latest_finalized: Checkpoint,
    /// A list of historical block root hashes, one entry per slot.
    /// Empty slots are recorded as the zero root.
    pub historical_block_hashes: HistoricalBlockHashes,
    /// A bitfield indicating which historical slots were justified
    pub justified_slots: JustifiedSlots,
    /// Registry of validators tracked by the state
    pub validators: Validators,
    /// Roots currently accumulating justification votes, lex-sorted.
    pub justifications_roots: JustificationRoots,
    /// Per-root validator votes, packed `num_validators` bits per root
    /// in `justifications_roots` order.
    pub justifications_validators: JustificationValidators,
}

impl State {
    /// Number of validators in the registry.
    pub fn num_validators(&self) -> u64 {
        self.validators.len() as u64
    }
}
