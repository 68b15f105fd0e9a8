// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level AES-256-GCM seal/open operations for campaign contact lists.
//!
//! Every call to [`seal`] generates a fresh random 96-bit nonce via the
//! system CSPRNG, so the nonce is never reused across campaigns. Nonce reuse
//! would be catastrophic for GCM security.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use sendero_core::SenderoError;
use zeroize::Zeroizing;

/// Encrypt plaintext with AES-256-GCM using a random 96-bit nonce.
///
/// Returns `(ciphertext_with_tag, nonce_bytes)`. The caller must store both
/// alongside each other to be able to decrypt later.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; 12]), SenderoError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| SenderoError::Store {
        source: "failed to create AES-256-GCM key".into(),
    })?;
    let less_safe = LessSafeKey::new(unbound);

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes).map_err(|_| SenderoError::Store {
        source: "failed to generate random nonce".into(),
    })?;

    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    // Seal in place: plaintext buffer is extended with the authentication tag.
    let mut in_out = plaintext.to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| SenderoError::Store {
            source: "AES-256-GCM encryption failed".into(),
        })?;

    Ok((in_out, nonce_bytes))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// `ciphertext` must include the 16-byte authentication tag appended by
/// [`seal`]. Fails if the key is wrong or the data is tampered.
pub fn open(
    key: &[u8; 32],
    nonce_bytes: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SenderoError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| SenderoError::Store {
        source: "failed to create AES-256-GCM key".into(),
    })?;
    let less_safe = LessSafeKey::new(unbound);

    let nonce = Nonce::assume_unique_for_key(*nonce_bytes);

    let mut in_out = ciphertext.to_vec();
    let plaintext = less_safe
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| SenderoError::Store {
            source: "AES-256-GCM decryption failed -- wrong key or corrupted data".into(),
        })?;

    Ok(plaintext.to_vec())
}

/// Decode a hex-encoded 32-byte key into zeroize-on-drop key material.
pub fn decode_key(key_hex: &str) -> Result<Zeroizing<[u8; 32]>, SenderoError> {
    let bytes = hex::decode(key_hex)
        .map_err(|e| SenderoError::Config(format!("encryption key is not valid hex: {e}")))?;
    let key: [u8; 32] = bytes.try_into().map_err(|_| {
        SenderoError::Config("encryption key must decode to exactly 32 bytes".to_string())
    })?;
    Ok(Zeroizing::new(key))
}
