//! Canonical byte codec.
//!
//! Every value object that crosses the submission boundary has exactly one
//! accepted byte encoding. Decoding consumes the whole input and the decoded
//! value must re-encode byte-for-byte, otherwise the input is rejected.

use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

/// Version tag expected as the first byte of a block header envelope.
pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty envelope")]
    EmptyEnvelope,
    #[error("unknown envelope version: {0}")]
    UnknownVersion(u8),
    #[error("data does not deserialize: {0}")]
    Decode(String),
    #[error("data does not reserialize canonically")]
    NonCanonical,
}

/// Encode a value with the canonical codec.
pub fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    // Borsh serialization of our value types cannot fail.
    borsh::to_vec(value).unwrap_or_default()
}

/// Decode a value, enforcing canonicity.
///
/// The decode must consume every input byte, and re-encoding the decoded
/// value must reproduce the input exactly.
pub fn decode_canonical<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: BorshSerialize + BorshDeserialize,
{
    let value = T::try_from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if encode(&value) != bytes {
        return Err(CodecError::NonCanonical);
    }
    Ok(value)
}

/// Decode a version-tagged envelope: one version byte followed by the
/// canonical encoding of `T`.
pub fn decode_versioned<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: BorshSerialize + BorshDeserialize,
{
    let (version, body) = bytes.split_first().ok_or(CodecError::EmptyEnvelope)?;
    if *version != ENVELOPE_VERSION {
        return Err(CodecError::UnknownVersion(*version));
    }
    decode_canonical(body)
}

/// Encode a value into a version-tagged envelope.
pub fn encode_versioned<T: BorshSerialize>(value: &T) -> Vec<u8> {
    let mut out = vec![ENVELOPE_VERSION];
    out.extend_from_slice(&encode(value));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::{Multihash, SHA2_256};
    use crate::types::BlockHeader;

    fn header() -> BlockHeader {
        BlockHeader {
            previous: Multihash::zero(SHA2_256),
            height: 1,
            timestamp: 1_700_000_000,
            nonce: 0,
        }
    }

    #[test]
    fn round_trip_is_canonical() {
        let encoded = encode(&header());
        let decoded: BlockHeader = decode_canonical(&encoded).unwrap();
        assert_eq!(decoded, header());
        assert_eq!(encode(&decoded), encoded);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = encode(&header());
        encoded.push(0);
        assert!(matches!(
            decode_canonical::<BlockHeader>(&encoded),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn envelope_version_is_checked() {
        let enveloped = encode_versioned(&header());
        assert!(decode_versioned::<BlockHeader>(&enveloped).is_ok());

        let mut wrong = enveloped.clone();
        wrong[0] = 2;
        assert_eq!(
            decode_versioned::<BlockHeader>(&wrong),
            Err(CodecError::UnknownVersion(2))
        );

        assert_eq!(
            decode_versioned::<BlockHeader>(&[]),
            Err(CodecError::EmptyEnvelope)
        );
    }
}
