use ssz::{Decode, DecodeError, Encode};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{
    attestation::{Attestation, Attestations},
    primitives::{H256, VariableList},
    signature::Signature,
    state::ValidatorRegistryLimit,
};

/// The header of a block, containing metadata.
///
/// Block headers summarize blocks without storing full content. The header
/// includes references to the parent and the resulting state. It also contains
/// a hash of the block body.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BlockHeader {
    /// The slot in which the block was proposed
    pub slot: u64,
    /// The index of the validator that proposed the block
    pub proposer_index: u64,
    /// The root of the parent block
    pub parent_root: H256,
    /// The root of the state after applying this block.
    ///
    /// Zero right after block processing; cached in on the next slot advance.
    pub state_root: H256,
    /// The root of the block body
    pub body_root: H256,
}

/// The body of a block, containing payload data.
///
/// Currently, the main operation is voting. Validators submit attestations
/// which are packaged into blocks.
#[derive(Debug, Default, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BlockBody {
    /// Plain validator attestations carried in the block body.
    ///
    /// Individual signatures live in the envelope's signature list, so
    /// these entries contain only attestation data without per-attestation
    /// signatures.
    pub attestations: Attestations,
}

/// A complete block including header and body.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Block {
    /// The slot in which the block was proposed.
    pub slot: u64,
    /// The index of the validator that proposed the block.
    pub proposer_index: u64,
    /// The root of the parent block.
    pub parent_root: H256,
    /// The root of the state after applying this block.
    pub state_root: H256,
    /// The block's payload.
    pub body: BlockBody,
}

impl Block {
    /// The header summarizing this block.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.tree_hash_root(),
        }
    }
}

/// SSZ `Union[None, Attestation]`: selector byte 0 for absent, 1 + body
/// for present.
///
/// Anchor envelopes carry no proposer attestation, every produced block
/// does; the selector keeps the two distinguishable on the wire.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OptionalAttestation(pub Option<Attestation>);

impl OptionalAttestation {
    pub fn as_ref(&self) -> Option<&Attestation> {
        self.0.as_ref()
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

impl From<Option<Attestation>> for OptionalAttestation {
    fn from(inner: Option<Attestation>) -> Self {
        Self(inner)
    }
}

impl Encode for OptionalAttestation {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        match &self.0 {
            None => buf.push(0),
            Some(attestation) => {
                buf.push(1);
                attestation.ssz_append(buf);
            }
        }
    }

    fn ssz_bytes_len(&self) -> usize {
        match &self.0 {
            None => 1,
            Some(attestation) => 1 + attestation.ssz_bytes_len(),
        }
    }
}

impl Decode for OptionalAttestation {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        match bytes.split_first() {
            None => Err(DecodeError::InvalidByteLength {
                len: 0,
                expected: 1,
            }),
            Some((0, [])) => Ok(Self(None)),
            Some((0, rest)) => Err(DecodeError::BytesInvalid(format!(
                "{} trailing bytes after None selector",
                rest.len()
            ))),
            Some((1, rest)) => Ok(Self(Some(Attestation::from_ssz_bytes(rest)?))),
            Some((selector, _)) => Err(DecodeError::UnionSelectorInvalid(*selector)),
        }
    }
}

/// Bundle containing a block and the proposer's attestation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct BlockWithAttestation {
    /// The proposed block message.
    pub block: Block,

    /// The proposer's attestation corresponding to this block.
    ///
    /// Absent only on anchor envelopes recorded at store initialization.
    pub proposer_attestation: OptionalAttestation,
}

/// Signature list included alongside the block.
pub type BlockSignatures = VariableList<Signature, ValidatorRegistryLimit>;

/// Envelope carrying a block, an attestation from the proposer, and the
/// signatures for both.
#[derive(Clone, PartialEq, Encode, Decode)]
pub struct SignedBlockWithAttestation {
    /// The block plus the proposer's attestation being signed.
    pub message: BlockWithAttestation,

    /// Signature payload for the block.
    ///
    /// Signatures remain in body attestation order, followed by the
    /// proposer signature when a proposer attestation is present. The
    /// list length must equal `expected_signatures()` exactly.
    pub signature: BlockSignatures,
}

impl SignedBlockWithAttestation {
    /// Wrap a bare block in an envelope with no proposer attestation and
    /// no signatures. Used for anchor blocks at store initialization.
    pub fn unsigned(block: Block) -> Self {
        Self {
            message: BlockWithAttestation {
                block,
                proposer_attestation: OptionalAttestation(None),
            },
            signature: BlockSignatures::empty(),
        }
    }

    /// The signature count this envelope must carry: one per body
    /// attestation, plus one for the proposer attestation if present.
    pub fn expected_signatures(&self) -> usize {
        let body = self.message.block.body.attestations.len();
        if self.message.proposer_attestation.is_some() {
            body + 1
        } else {
            body
        }
    }
}

// Manual Debug impl to keep signature bytes out of log output.
impl core::fmt::Debug for SignedBlockWithAttestation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignedBlockWithAttestation")
            .field("message", &self.message)
            .field("signature", &"...")
            .finish()
    }
}
