//! Sealed-box encryption for sharing a collection key with a recipient.
//!
//! Directly grounded on the teacher's `keys::seal_box_encrypt` /
//! `sodium_ffi::crypto_box_seal`. Rather than guess at `crypto_box`'s own
//! `seal` feature surface, this builds the construction libsodium's
//! `crypto_box_seal` itself uses on top of the plain `SalsaBox` API: an
//! ephemeral keypair, a nonce deterministically derived by hashing the two
//! public keys together (so it never needs to be transmitted separately),
//! and the ephemeral public key prepended to the ciphertext. No sender
//! identity is retained (spec GLOSSARY: "Sealed box").
use blake2::digest::consts::U24;
use blake2::{Blake2b, Digest};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use crypto_box::aead::{Aead, OsRng};
use zeroize::Zeroizing;

use super::CryptoError;

type Blake2b192 = Blake2b<U24>;

fn derive_nonce(ephemeral_pk: &PublicKey, recipient_pk: &PublicKey) -> crypto_box::Nonce {
    let mut hasher = Blake2b192::new();
    hasher.update(ephemeral_pk.as_bytes());
    hasher.update(recipient_pk.as_bytes());
    let digest = hasher.finalize();
    *crypto_box::Nonce::from_slice(&digest)
}

/// Encrypt `message` to `recipient_pk` using a fresh, discarded ephemeral
/// keypair.
///
/// Wire format: `ephemeral_pubkey (32 bytes) || ciphertext`.
pub fn seal(message: &[u8], recipient_pk: &PublicKey) -> Vec<u8> {
    let ephemeral_sk = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = ephemeral_sk.public_key();
    let nonce = derive_nonce(&ephemeral_pk, recipient_pk);

    let b = SalsaBox::new(recipient_pk, &ephemeral_sk);
    let ciphertext = b
        .encrypt(&nonce, message)
        .expect("sealed-box encryption cannot fail");

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt a sealed-box payload with the recipient's secret key.
pub fn unseal(sealed: &[u8], recipient_sk: &SecretKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < 32 {
        return Err(CryptoError::DecryptFailed);
    }
    let (pk_bytes, ciphertext) = sealed.split_at(32);

    let ephemeral_pk_bytes: [u8; 32] = pk_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let ephemeral_pk = PublicKey::from(ephemeral_pk_bytes);
    let recipient_pk = recipient_sk.public_key();
    let nonce = derive_nonce(&ephemeral_pk, &recipient_pk);

    let b = SalsaBox::new(&ephemeral_pk, recipient_sk);
    b.decrypt(&nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_shared_collection_key_decrypts_for_recipient() {
        let recipient_sk = SecretKey::generate(&mut OsRng);
        let recipient_pk = recipient_sk.public_key();

        let collection_key = [42u8; 32];
        let sealed = seal(&collection_key, &recipient_pk);
        let opened = unseal(&sealed, &recipient_sk).unwrap();
        assert_eq!(&*opened, &collection_key);
    }

    #[test]
    fn unseal_fails_for_wrong_recipient() {
        let recipient_sk = SecretKey::generate(&mut OsRng);
        let recipient_pk = recipient_sk.public_key();
        let other_sk = SecretKey::generate(&mut OsRng);

        let sealed = seal(b"collection key bytes............", &recipient_pk);
        assert!(unseal(&sealed, &other_sk).is_err());
    }
}
