//! Key-Chain Service (spec §4.B).
//!
//! Pure functions over byte strings; stateless, exactly as spec.md demands.
//! Grounded on the teacher's `keys.rs` (`UserKeypair`, `seal_box_encrypt`)
//! and `encryption.rs` (`EncryptionService`), rebuilt on the pure-Rust
//! crates already named in the teacher's own `Cargo.toml` instead of the
//! libsodium FFI its current source happens to use.
pub mod aead;
pub mod chain;
pub mod identity;
pub mod kdf;
pub mod sealed_box;

use thiserror::Error;
use zeroize::Zeroizing;

/// A symmetrically-sealed payload: ciphertext + the nonce needed to open it.
/// This is the shape of `encrypted_master_key`, `encrypted_collection_key`,
/// `encrypted_file_key`, `encrypted_metadata`, and `encrypted_name` in the
/// data model (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 24],
}

pub type Key32 = Zeroizing<[u8; 32]>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decryption failed after exhausting current key and all previous_keys")]
    DecryptFailed,
    #[error("invalid key material length")]
    InvalidKeyLength,
    #[error("invalid recipient public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("random number generation failed: {0}")]
    Random(String),
}

/// Zero-fill a byte buffer and rebuild it. Used when a caller needs to
/// scrub an intermediate `Vec<u8>` that cannot itself be `Zeroizing`
/// (e.g. because it was handed across an FFI-shaped boundary) on every
/// exit path, including error paths -- spec §4.B's requirement.
pub fn zero(buf: &mut [u8]) {
    use zeroize::Zeroize;
    buf.zeroize();
}
