// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM and SHA-256 operations.
//!
//! Every call to [`encrypt`] generates a fresh random 96-bit IV via the system
//! CSPRNG. IV reuse under one key would be catastrophic for GCM security.
//! The blob's algorithm and version are bound as associated data, so they
//! cannot be altered without failing authentication.

use keyward_core::KeywardError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// Algorithm tag written into every blob.
pub const ALGORITHM: &str = "AES-GCM";

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM IV length in bytes.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Ciphertext plus everything needed to decrypt it, except the key.
///
/// `version` is the generation of the purpose key that sealed the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub algorithm: String,
    pub version: u32,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    /// Ciphertext with the 16-byte tag appended.
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

impl EncryptedBlob {
    /// Structural checks performed before any decryption attempt.
    pub fn validate(&self) -> Result<(), KeywardError> {
        if self.algorithm != ALGORITHM {
            return Err(KeywardError::InvalidFormat(format!(
                "unsupported algorithm `{}`",
                self.algorithm
            )));
        }
        if self.version == 0 {
            return Err(KeywardError::InvalidFormat("blob version must be >= 1".into()));
        }
        if self.iv.len() != IV_LEN {
            return Err(KeywardError::InvalidFormat(format!(
                "iv must be {IV_LEN} bytes, got {}",
                self.iv.len()
            )));
        }
        if self.data.len() < TAG_LEN {
            return Err(KeywardError::InvalidFormat(
                "ciphertext shorter than authentication tag".into(),
            ));
        }
        Ok(())
    }

    /// Parse a blob from its JSON form, mapping shape errors to `InvalidFormat`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, KeywardError> {
        let blob: Self = serde_json::from_value(value.clone())
            .map_err(|e| KeywardError::InvalidFormat(format!("not an encrypted blob: {e}")))?;
        blob.validate()?;
        Ok(blob)
    }

    fn aad(&self) -> String {
        blob_aad(&self.algorithm, self.version)
    }
}

fn blob_aad(algorithm: &str, version: u32) -> String {
    format!("{algorithm}:v{version}")
}

fn less_safe_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, KeywardError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| KeywardError::EncryptionFailed("failed to create AES-256-GCM key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    version: u32,
) -> Result<EncryptedBlob, KeywardError> {
    let sealing = less_safe_key(key)?;
    let iv: [u8; IV_LEN] = random_bytes()?;
    let aad = blob_aad(ALGORITHM, version);

    // Seal in place: the buffer is extended with the authentication tag.
    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::from(aad.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| KeywardError::EncryptionFailed("AES-256-GCM seal failed".into()))?;

    Ok(EncryptedBlob {
        algorithm: ALGORITHM.to_string(),
        version,
        iv: iv.to_vec(),
        data: in_out,
    })
}

/// Decrypt `blob` under `key`.
///
/// Fails with [`KeywardError::DecryptionFailed`] on a wrong key or any
/// tampering; never returns partial plaintext.
pub fn decrypt(blob: &EncryptedBlob, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, KeywardError> {
    blob.validate()?;
    let opening = less_safe_key(key).map_err(|_| KeywardError::DecryptionFailed)?;
    let iv: [u8; IV_LEN] = blob
        .iv
        .as_slice()
        .try_into()
        .map_err(|_| KeywardError::DecryptionFailed)?;

    let aad = blob.aad();
    let mut in_out = blob.data.clone();
    let plaintext = opening
        .open_in_place(
            Nonce::assume_unique_for_key(iv),
            Aad::from(aad.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| KeywardError::DecryptionFailed)?;

    Ok(plaintext.to_vec())
}

/// SHA-256 of `data`, hex encoded.
pub fn hash(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// Fill an array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], KeywardError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| KeywardError::Internal("system random generator failed".into()))?;
    Ok(out)
}

/// Generate a random 32-byte key suitable for AES-256-GCM.
pub fn generate_random_key() -> Result<[u8; KEY_LEN], KeywardError> {
    random_bytes()
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_random_key().unwrap();
        let blob = encrypt(b"secret api key value", &key, 1).unwrap();
        assert_eq!(decrypt(&blob, &key).unwrap(), b"secret api key value");
    }

    #[test]
    fn same_plaintext_gets_fresh_iv() {
        let key = generate_random_key().unwrap();
        let a = encrypt(b"same input twice", &key, 1).unwrap();
        let b = encrypt(b"same input twice", &key, 1).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn wrong_key_fails() {
        let blob = encrypt(b"secret data", &generate_random_key().unwrap(), 1).unwrap();
        let err = decrypt(&blob, &generate_random_key().unwrap()).unwrap_err();
        assert!(matches!(err, KeywardError::DecryptionFailed));
    }

    #[test]
    fn ciphertext_carries_tag() {
        let key = generate_random_key().unwrap();
        let blob = encrypt(b"hello", &key, 1).unwrap();
        assert_eq!(blob.data.len(), 5 + TAG_LEN);
        assert_eq!(blob.iv.len(), IV_LEN);
        assert_eq!(blob.algorithm, ALGORITHM);
    }

    #[test]
    fn any_flipped_bit_fails() {
        let key = generate_random_key().unwrap();
        let blob = encrypt(b"do not tamper", &key, 1).unwrap();

        for i in 0..blob.data.len() {
            let mut tampered = blob.clone();
            tampered.data[i] ^= 0x01;
            assert!(decrypt(&tampered, &key).is_err(), "data byte {i}");
        }
        for i in 0..IV_LEN {
            let mut tampered = blob.clone();
            tampered.iv[i] ^= 0x80;
            assert!(decrypt(&tampered, &key).is_err(), "iv byte {i}");
        }
    }

    #[test]
    fn version_is_authenticated() {
        let key = generate_random_key().unwrap();
        let mut blob = encrypt(b"bound", &key, 1).unwrap();
        blob.version = 2;
        assert!(matches!(
            decrypt(&blob, &key).unwrap_err(),
            KeywardError::DecryptionFailed
        ));
    }

    #[test]
    fn malformed_blob_is_invalid_format() {
        let key = generate_random_key().unwrap();
        let mut blob = encrypt(b"x", &key, 1).unwrap();
        blob.iv.truncate(4);
        assert!(matches!(
            decrypt(&blob, &key).unwrap_err(),
            KeywardError::InvalidFormat(_)
        ));

        let json = serde_json::json!({ "algorithm": "AES-CBC", "version": 1, "iv": "", "data": "" });
        assert!(matches!(
            EncryptedBlob::from_value(&json).unwrap_err(),
            KeywardError::InvalidFormat(_)
        ));
    }

    #[test]
    fn blob_json_roundtrip_uses_base64() {
        let key = generate_random_key().unwrap();
        let blob = encrypt(b"wire", &key, 3).unwrap();
        let json = serde_json::to_value(&blob).unwrap();
        assert!(json["iv"].is_string());
        assert_eq!(EncryptedBlob::from_value(&json).unwrap(), blob);
    }

    #[test]
    fn hash_is_deterministic_sha256() {
        assert_eq!(
            hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash(b"abc"), hash(b"abd"));
    }
}
