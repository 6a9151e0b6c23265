//! Symmetric sealing for master/collection/file keys, metadata, and names.
//!
//! `XChaCha20Poly1305` is used (rather than `Aes256Gcm`) for its 24-byte
//! extended nonce, which removes the birthday-bound nonce-reuse risk across
//! the many rotations `previous_keys` is designed to tolerate.
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use super::{CryptoError, Key32, Sealed};

/// Seal `plaintext` under `key`, generating a fresh random nonce.
pub fn seal(key: &Key32, plaintext: &[u8]) -> Sealed {
    let cipher = XChaCha20Poly1305::new(key.as_ref().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    // Encryption of well-formed plaintext under a freshly generated nonce
    // cannot fail for this AEAD.
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("XChaCha20Poly1305 encryption cannot fail");
    Sealed {
        ciphertext,
        nonce: nonce.into(),
    }
}

/// Open a `Sealed` payload under `key`.
pub fn open(key: &Key32, sealed: &Sealed) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_ref().into());
    let nonce = XNonce::from_slice(&sealed.nonce);
    cipher
        .decrypt(nonce, sealed.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptFailed)
}
