//! Hash-verification work items.
//!
//! The verifier service takes a payload of `expected_hash ‖ preimage`,
//! hashes the preimage with Blake2s-256 during refine and reports
//! `result_code ‖ computed_hash`.

use crate::encoding::bytes_to_hex;
use crate::error::ProtocolError;
use blake2::{Blake2s256, Digest};

/// Size of a Blake2s-256 digest.
pub const HASH_SIZE: usize = 32;

const RESULT_VALID: u8 = 0x01;
const RESULT_INVALID: u8 = 0x00;
const RESULT_PAYLOAD_TOO_SHORT: u8 = 0xE1;

/// Blake2s-256 of `data`.
pub fn blake2s256(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&Blake2s256::digest(data));
    hash
}

/// Payload for one hash-verification work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashVerifyPayload {
    expected_hash: [u8; HASH_SIZE],
    preimage: Vec<u8>,
}

impl HashVerifyPayload {
    /// Builds a payload whose expected hash matches `preimage`.
    ///
    /// The service rejects payloads without at least one preimage byte.
    pub fn new(preimage: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let preimage = preimage.into();
        if preimage.is_empty() {
            return Err(ProtocolError::EmptyPreimage);
        }
        Ok(Self {
            expected_hash: blake2s256(&preimage),
            preimage,
        })
    }

    /// Increments the first byte of the expected hash so verification fails.
    pub fn tamper(mut self) -> Self {
        self.expected_hash[0] = self.expected_hash[0].wrapping_add(1);
        self
    }

    pub fn expected_hash(&self) -> &[u8; HASH_SIZE] {
        &self.expected_hash
    }

    pub fn preimage(&self) -> &[u8] {
        &self.preimage
    }

    /// Whether the expected hash matches the preimage.
    pub fn is_consistent(&self) -> bool {
        blake2s256(&self.preimage) == self.expected_hash
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HASH_SIZE + self.preimage.len());
        bytes.extend_from_slice(&self.expected_hash);
        bytes.extend_from_slice(&self.preimage);
        bytes
    }

    /// `0x`-prefixed hex of the payload, as passed to `item`.
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.to_bytes())
    }
}

/// Outcome reported by the verifier's refine stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid([u8; HASH_SIZE]),
    Invalid([u8; HASH_SIZE]),
    PayloadTooShort,
}

impl Verification {
    /// Parses `result_code ‖ computed_hash`.
    pub fn from_output(output: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = || ProtocolError::InvalidVerification(bytes_to_hex(output));
        if output.len() != 1 + HASH_SIZE {
            return Err(malformed());
        }
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&output[1..]);
        match output[0] {
            RESULT_VALID => Ok(Verification::Valid(hash)),
            RESULT_INVALID => Ok(Verification::Invalid(hash)),
            RESULT_PAYLOAD_TOO_SHORT => Ok(Verification::PayloadTooShort),
            _ => Err(malformed()),
        }
    }
}
