//! Signing capability traits for the consensus core.
//!
//! The post-quantum XMSS scheme is injected behind [`Signer`] and
//! [`Verifier`]: the core only handles 52-byte public keys, 32-byte
//! message roots, fixed 3112-byte signatures, and a `u32` signing
//! context. For attestations and proposer attestations alike, the
//! context is `data.slot mod 2^32`.

use sha2::{Digest, Sha256};
use thiserror::Error;

use rean_types::{
    primitives::{FixedVector, H256},
    signature::{PUBKEY_SIZE, Pubkey, SIGNATURE_SIZE, Signature},
};

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing context {0} is outside the key's active range")]
    ContextOutOfRange(u32),
    #[error("signing failed: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signature verification failed")]
    Rejected,
    #[error("malformed public key")]
    MalformedPubkey,
    #[error("malformed signature")]
    MalformedSignature,
}

/// Produces signatures on behalf of one validator.
pub trait Signer: Send + Sync {
    /// Sign a 32-byte message root under the given signing context.
    fn sign(&self, context: u32, message: &H256) -> Result<Signature, SignError>;

    /// The public key signatures from this signer verify against.
    fn public_key(&self) -> Pubkey;
}

/// Verifies signatures against registered validator public keys.
pub trait Verifier: Send + Sync {
    fn verify(
        &self,
        pubkey: &Pubkey,
        context: u32,
        message: &H256,
        signature: &Signature,
    ) -> Result<(), VerifyError>;
}

/// A verifier that accepts every signature.
///
/// Used by tests and fixtures that exercise consensus logic with
/// zeroed signature payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl Verifier for AcceptAllVerifier {
    fn verify(
        &self,
        _pubkey: &Pubkey,
        _context: u32,
        _message: &H256,
        _signature: &Signature,
    ) -> Result<(), VerifyError> {
        Ok(())
    }
}

fn expand_digest(seed: &[u8], label: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u32;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(label);
        hasher.update(seed);
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn digest_signature(pubkey: &Pubkey, context: u32, message: &H256) -> Signature {
    let mut seed = Vec::with_capacity(PUBKEY_SIZE + 4 + 32);
    seed.extend_from_slice(&pubkey[..]);
    seed.extend_from_slice(&context.to_le_bytes());
    seed.extend_from_slice(message.as_slice());
    let bytes = expand_digest(&seed, b"rean/sig", SIGNATURE_SIZE);
    FixedVector::new(bytes).expect("expanded to exact signature size")
}

/// Deterministic stand-in signer for tests and local devnets.
///
/// Signatures are SHA-256 expansions keyed by the public key, context,
/// and message. This is NOT a real post-quantum scheme and provides no
/// security whatsoever; it exists so the signature plumbing (sizes,
/// ordering, contexts) is exercised end to end without the XMSS backend.
#[derive(Debug, Clone)]
pub struct DigestSigner {
    pubkey: Pubkey,
}

impl DigestSigner {
    /// Derive the signer for a seed. The same seed always yields the
    /// same public key, so genesis configs can be generated offline.
    pub fn from_seed(seed: u64) -> Self {
        let bytes = expand_digest(&seed.to_le_bytes(), b"rean/key", PUBKEY_SIZE);
        let pubkey = FixedVector::new(bytes).expect("expanded to exact pubkey size");
        Self { pubkey }
    }
}

impl Signer for DigestSigner {
    fn sign(&self, context: u32, message: &H256) -> Result<Signature, SignError> {
        Ok(digest_signature(&self.pubkey, context, message))
    }

    fn public_key(&self) -> Pubkey {
        self.pubkey.clone()
    }
}

/// Verifier counterpart of [`DigestSigner`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestVerifier;

impl Verifier for DigestVerifier {
    fn verify(
        &self,
        pubkey: &Pubkey,
        context: u32,
        message: &H256,
        signature: &Signature,
    ) -> Result<(), VerifyError> {
        if digest_signature(pubkey, context, message) == *signature {
            Ok(())
        } else {
            Err(VerifyError::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let signer = DigestSigner::from_seed(7);
        let message = H256::from([42u8; 32]);

        let signature = signer.sign(3, &message).unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);

        DigestVerifier
            .verify(&signer.public_key(), 3, &message, &signature)
            .unwrap();
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let signer = DigestSigner::from_seed(7);
        let signature = signer.sign(3, &H256::from([42u8; 32])).unwrap();

        let err = DigestVerifier
            .verify(&signer.public_key(), 3, &H256::from([43u8; 32]), &signature)
            .unwrap_err();
        assert!(matches!(err, VerifyError::Rejected));
    }

    #[test]
    fn verify_rejects_wrong_context() {
        let signer = DigestSigner::from_seed(7);
        let message = H256::from([42u8; 32]);
        let signature = signer.sign(3, &message).unwrap();

        assert!(
            DigestVerifier
                .verify(&signer.public_key(), 4, &message, &signature)
                .is_err()
        );
    }

    #[test]
    fn different_seeds_yield_different_keys() {
        assert_ne!(
            DigestSigner::from_seed(1).public_key(),
            DigestSigner::from_seed(2).public_key()
        );
    }
}
