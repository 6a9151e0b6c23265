//! The key hierarchy traversal (spec §4.B):
//!
//! ```text
//! password + salt --derive--> KEK
//! KEK + user.encrypted_master_key --unseal--> master_key
//! master_key + collection.encrypted_collection_key --unseal--> collection_key
//! collection_key + file.encrypted_file_key --unseal--> file_key
//! file_key + file.encrypted_metadata --unseal--> metadata
//! collection_key + collection.encrypted_name --unseal--> name
//! ```
//!
//! `previous_keys` holds historical *collection key* wrappings (spec §3).
//! When a payload was sealed under an older collection key (because
//! rotation doesn't eagerly re-encrypt everything -- spec §9), unwrapping
//! it requires trying the current collection key first, then each
//! historical one newest-to-oldest (invariant 6), exactly as
//! `ExecuteDecryptCollectionKeyChain` is contracted to behave.
use tracing::warn;
use zeroize::Zeroizing;

use super::{aead, CryptoError, Key32, Sealed};
use crate::model::collection::KeyWrapping;

/// `KEK + user.encrypted_master_key -> master_key`.
pub fn unwrap_master_key(kek: &Key32, encrypted_master_key: &Sealed) -> Result<Key32, CryptoError> {
    let bytes = aead::open(kek, encrypted_master_key)?;
    to_key32(&bytes)
}

/// `master_key + collection.encrypted_collection_key -> collection_key` for
/// the *current* key only (no fallback attempted here).
pub fn unwrap_collection_key(
    master_key: &Key32,
    encrypted_collection_key: &Sealed,
) -> Result<Key32, CryptoError> {
    let bytes = aead::open(master_key, encrypted_collection_key)?;
    to_key32(&bytes)
}

/// All collection-key candidates that a given collection's owner might need
/// to try, current first then `previous_keys` newest-to-oldest. Entries
/// that fail to unwrap under `master_key` (corruption, or a version sealed
/// for someone else) are logged and skipped rather than aborting the whole
/// traversal -- a single bad historical entry must not block access to
/// everything sealed under keys that still unwrap cleanly.
pub fn collection_key_candidates(
    master_key: &Key32,
    current: &Sealed,
    previous_keys: &[KeyWrapping],
) -> Vec<Key32> {
    let mut candidates = Vec::with_capacity(previous_keys.len() + 1);
    match unwrap_collection_key(master_key, current) {
        Ok(k) => candidates.push(k),
        Err(e) => warn!(error = %e, "failed to unwrap current collection key"),
    }
    for wrapping in previous_keys.iter().rev() {
        match unwrap_collection_key(master_key, &wrapping.sealed) {
            Ok(k) => candidates.push(k),
            Err(e) => warn!(
                key_version = wrapping.key_version,
                error = %e,
                "failed to unwrap historical collection key, skipping"
            ),
        }
    }
    candidates
}

/// Try to open `sealed` under each candidate key in order, returning the
/// first success. Fails only once every candidate has been exhausted
/// (invariant 6 / spec §4.B).
pub fn open_with_fallback(
    sealed: &Sealed,
    candidates: &[Key32],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    for key in candidates {
        if let Ok(plaintext) = aead::open(key, sealed) {
            return Ok(plaintext);
        }
    }
    Err(CryptoError::DecryptFailed)
}

/// `collection_key + file.encrypted_file_key -> file_key`, trying the
/// supplied collection-key candidates in order.
pub fn unwrap_file_key(
    collection_key_candidates: &[Key32],
    encrypted_file_key: &Sealed,
) -> Result<Key32, CryptoError> {
    let bytes = open_with_fallback(encrypted_file_key, collection_key_candidates)?;
    to_key32(&bytes)
}

fn to_key32(bytes: &[u8]) -> Result<Key32, CryptoError> {
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(Zeroizing::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::collection::KeyWrapping;

    fn key(byte: u8) -> Key32 {
        Zeroizing::new([byte; 32])
    }

    #[test]
    fn scenario_4_key_rotation_tolerance() {
        let master_key = key(1);
        let v1 = key(11);
        let v2 = key(22);

        // v1 is the historical (previous_keys) wrapping, v2 is current.
        let sealed_v1 = aead::seal(&master_key, v1.as_ref());
        let sealed_v2 = aead::seal(&master_key, v2.as_ref());

        let previous = vec![KeyWrapping {
            key_version: 1,
            sealed: sealed_v1,
            rotated_at: "2026-01-01T00:00:00Z".to_string(),
            rotated_reason: "manual".to_string(),
            algorithm: "xchacha20poly1305".to_string(),
        }];

        let candidates = collection_key_candidates(&master_key, &sealed_v2, &previous);
        assert_eq!(candidates.len(), 2);

        // A file's file_key was sealed under v1 before rotation.
        let file_key = key(99);
        let encrypted_file_key = aead::seal(&v1, file_key.as_ref());

        let unwrapped = unwrap_file_key(&candidates, &encrypted_file_key).unwrap();
        assert_eq!(*unwrapped, *file_key);
    }

    #[test]
    fn fails_only_after_exhausting_every_candidate() {
        let candidates = vec![key(1), key(2), key(3)];
        let sealed = aead::seal(&key(4), b"wrapped under a key nobody has");
        assert!(matches!(
            open_with_fallback(&sealed, &candidates),
            Err(CryptoError::DecryptFailed)
        ));
    }
}
