//! Transport-independent wire codecs for the lean consensus protocol.
//!
//! This crate owns the payload formats only: gossip topic envelopes,
//! the req/resp snappy framing, the status payload, and blocks-by-root
//! chunks. Stream transport, peer discovery, and gossip routing live
//! outside the consensus core and plug in on top of these codecs.

pub mod gossip;
pub mod reqresp;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snappy error: {0}")]
    Snappy(#[from] snap::Error),
    #[error("ssz decode error: {0:?}")]
    Ssz(ssz::DecodeError),
    #[error("message too large: {0} bytes")]
    TooLarge(u64),
    #[error("invalid payload length: {0}")]
    InvalidLength(usize),
    #[error("too many roots requested: {0}")]
    TooManyRoots(usize),
}

impl From<ssz::DecodeError> for WireError {
    fn from(err: ssz::DecodeError) -> Self {
        Self::Ssz(err)
    }
}

/// Maximum uncompressed payload size accepted on any wire path.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10 MB
