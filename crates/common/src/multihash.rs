use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Multihash code for SHA2-256.
pub const SHA2_256: u64 = 0x12;

const SHA2_256_DIGEST_LEN: usize = 32;

/// A self-describing hash: a hash-function code paired with the digest bytes.
///
/// Equality and ordering are defined on the `(code, digest)` pair. The zero
/// multihash for a code (all digest bytes zero) is the distinguished "no
/// parent" value used by the genesis state.
#[derive(
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct Multihash {
    pub code: u64,
    pub digest: Vec<u8>,
}

impl Multihash {
    /// Hash `data` with SHA2-256.
    pub fn sha2_256(data: &[u8]) -> Self {
        Self {
            code: SHA2_256,
            digest: Sha256::digest(data).to_vec(),
        }
    }

    /// The zero multihash for `code`: a digest of the standard length for
    /// that code with every byte zero.
    pub fn zero(code: u64) -> Self {
        Self {
            code,
            digest: vec![0u8; digest_length(code)],
        }
    }

    /// True when every digest byte is zero.
    pub fn is_zero(&self) -> bool {
        self.digest.iter().all(|b| *b == 0)
    }
}

fn digest_length(code: u64) -> usize {
    match code {
        SHA2_256 => SHA2_256_DIGEST_LEN,
        _ => SHA2_256_DIGEST_LEN,
    }
}

impl fmt::Display for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}:{}", self.code, hex::encode(&self.digest))
    }
}

impl fmt::Debug for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
