//! Password -> KEK derivation, and KEK/master-key unwrap/wrap helpers.
//!
//! `password + salt --derive--> KEK` (spec §4.B). Argon2id is
//! CPU/memory-hard by design -- the teacher's architecture notes (spec §5)
//! call password KDF out explicitly as "intentionally slow".
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use zeroize::Zeroizing;

use super::{CryptoError, Key32};

/// Derive a 32-byte Key-Encryption-Key from a password and a stored salt.
///
/// The salt is the raw bytes from `User.password_salt`; it is re-encoded as
/// a b64 `SaltString` only because that's the interface `argon2` exposes --
/// no additional randomness is introduced here.
pub fn derive_kek(password: &str, salt: &[u8]) -> Result<Key32, CryptoError> {
    let salt_string = SaltString::encode_b64(salt)
        .map_err(|e| CryptoError::Random(format!("invalid salt: {e}")))?;
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt_string)
        .map_err(|e| CryptoError::Random(format!("argon2 failed: {e}")))?;
    let output = hash
        .hash
        .ok_or_else(|| CryptoError::Random("argon2 produced no output".to_string()))?;
    let bytes = output.as_bytes();
    if bytes.len() < 32 {
        return Err(CryptoError::InvalidKeyLength);
    }
    let mut kek = [0u8; 32];
    kek.copy_from_slice(&bytes[..32]);
    Ok(Zeroizing::new(kek))
}

/// Generate a fresh random salt suitable for storing in `User.password_salt`.
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
