// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SHA-256 checksums over encrypted blobs and arbitrary data.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::primitives::{self, EncryptedBlob};

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    /// Hex SHA-256 of the checked data.
    pub hash: String,
    /// False only when an expected hash was given and differs.
    pub valid: bool,
}

/// Checksum over every field of `blob`.
///
/// Fields are length-prefixed so no two distinct blobs share an encoding.
pub fn checksum(blob: &EncryptedBlob) -> String {
    let iv = STANDARD.encode(&blob.iv);
    let data = STANDARD.encode(&blob.data);
    let canonical = format!(
        "{}:{}|{}|{}:{}|{}:{}",
        blob.algorithm.len(),
        blob.algorithm,
        blob.version,
        iv.len(),
        iv,
        data.len(),
        data
    );
    primitives::hash(canonical.as_bytes())
}

/// Whether `expected` is the checksum of `blob`. Hex case is ignored.
pub fn validate(blob: &EncryptedBlob, expected: &str) -> bool {
    checksum(blob).eq_ignore_ascii_case(expected.trim())
}

/// Hash `data` and compare against `expected` when one is given.
pub fn verify(data: &[u8], expected: Option<&str>) -> IntegrityCheck {
    let hash = primitives::hash(data);
    let valid = expected.is_none_or(|e| hash.eq_ignore_ascii_case(e.trim()));
    IntegrityCheck { hash, valid }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{encrypt, generate_random_key};

    fn blob() -> EncryptedBlob {
        encrypt(b"checksummed", &generate_random_key().unwrap(), 1).unwrap()
    }

    #[test]
    fn checksum_validates_untouched_blob() {
        let blob = blob();
        let sum = checksum(&blob);
        assert!(validate(&blob, &sum));
        assert!(validate(&blob, &sum.to_uppercase()));
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let blob = blob();
        let sum = checksum(&blob);
        for byte in 0..blob.data.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered.data[byte] ^= 1 << bit;
                assert!(!validate(&tampered, &sum), "data byte {byte} bit {bit}");
            }
        }
        for byte in 0..blob.iv.len() {
            let mut tampered = blob.clone();
            tampered.iv[byte] ^= 0x10;
            assert!(!validate(&tampered, &sum), "iv byte {byte}");
        }
        let mut bumped = blob.clone();
        bumped.version += 1;
        assert!(!validate(&bumped, &sum));
    }

    #[test]
    fn verify_without_expected_is_valid() {
        let check = verify(b"abc", None);
        assert!(check.valid);
        assert_eq!(check.hash.len(), 64);
    }

    #[test]
    fn verify_mismatch_is_invalid() {
        let good = verify(b"abc", None).hash;
        assert!(verify(b"abc", Some(&good)).valid);
        assert!(!verify(b"abd", Some(&good)).valid);
    }
}
