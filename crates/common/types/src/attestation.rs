use ssz_derive::{Decode, Encode};
use ssz_types::typenum::{Prod, U4096};
use tree_hash_derive::TreeHash;

use crate::{
    primitives::{BitList, ByteList, VariableList},
    signature::{Signature, SignatureSize},
    state::Checkpoint,
};

/// Validator specific attestation wrapping shared attestation data.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Attestation {
    /// The index of the validator making the attestation.
    pub validator_id: u64,

    /// The attestation data produced by the validator.
    pub data: AttestationData,
}

/// Attestation content describing the validator's observed chain view.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct AttestationData {
    /// The slot for which the attestation is made.
    pub slot: u64,

    /// The checkpoint representing the head block as observed by the validator.
    pub head: Checkpoint,

    /// The checkpoint representing the target block as observed by the validator.
    pub target: Checkpoint,

    /// The checkpoint representing the source block as observed by the validator.
    pub source: Checkpoint,
}

/// List of validator attestations included in a block.
pub type Attestations = VariableList<Attestation, U4096>;

/// Validator attestation bundled with its signature.
#[derive(Clone, PartialEq, Encode, Decode)]
pub struct SignedAttestation {
    /// The attestation message signed by the validator.
    pub message: Attestation,
    /// The validator's XMSS signature over `message.tree_hash_root()`.
    pub signature: Signature,
}

// Manual Debug impl to keep signature bytes out of log output.
impl core::fmt::Debug for SignedAttestation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignedAttestation")
            .field("message", &self.message)
            .field("signature", &"...")
            .finish()
    }
}

/// Aggregation bitfield: one bit per participating validator index.
pub type AggregationBits = BitList<U4096>;

/// Concatenated signature bytes, bounded by 4096 signatures.
pub type AggregatedSignatureBytes = ByteList<Prod<U4096, SignatureSize>>;

/// An attestation aggregated from multiple validators over the same data.
///
/// Signatures are concatenated in ascending validator index order:
/// `sig_0 || sig_1 || sig_2 || ...`, matching the set bits.
#[derive(Clone, PartialEq, Encode, Decode)]
pub struct AggregatedAttestation {
    pub data: AttestationData,
    pub aggregation_bits: AggregationBits,
    pub aggregated_signature: AggregatedSignatureBytes,
}

impl core::fmt::Debug for AggregatedAttestation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AggregatedAttestation")
            .field("data", &self.data)
            .field("aggregation_bits", &self.aggregation_bits)
            .field("aggregated_signature", &"...")
            .finish()
    }
}
