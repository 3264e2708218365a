use ssz_types::typenum::{Diff, U52, U488, U3600};

use crate::primitives::FixedVector;

/// Byte length of an individual XMSS signature.
pub const SIGNATURE_SIZE: usize = 3112;

/// Byte length of a validator public key.
pub const PUBKEY_SIZE: usize = 52;

/// Type-level signature size (3112 bytes).
pub type SignatureSize = Diff<U3600, U488>;

/// Type-level public key size (52 bytes).
pub type PubkeySize = U52;

/// A serialized XMSS signature.
///
/// The post-quantum scheme itself lives behind the `Signer`/`Verifier`
/// capability traits; the consensus core only moves fixed-size blobs.
pub type Signature = FixedVector<u8, SignatureSize>;

/// A serialized validator public key.
pub type Pubkey = FixedVector<u8, PubkeySize>;

#[cfg(test)]
mod tests {
    use super::*;
    use ssz_types::typenum::Unsigned;

    #[test]
    fn type_level_sizes_match_constants() {
        assert_eq!(SignatureSize::to_usize(), SIGNATURE_SIZE);
        assert_eq!(PubkeySize::to_usize(), PUBKEY_SIZE);
    }
}
