//! A user's asymmetric identity: signing (Ed25519) and key-wrapping (X25519).
//!
//! The teacher derives X25519 keys from a single Ed25519 seed via
//! libsodium's `crypto_sign_ed25519_*_to_curve25519` conversion
//! (`keys::UserKeypair::to_x25519_*_key`). `ed25519-dalek` and `crypto_box`
//! don't expose that conversion, so this derives both keypairs from one
//! master seed via HKDF-SHA256 instead -- same "one identity, two uses"
//! shape, different derivation path.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::CryptoError;

const SIGNING_INFO: &[u8] = b"veil-identity-ed25519-v1";
const ENCRYPTION_INFO: &[u8] = b"veil-identity-x25519-v1";

/// A user's global (not per-collection) asymmetric identity.
pub struct UserIdentity {
    signing_key: SigningKey,
    encryption_key: crypto_box::SecretKey,
}

impl UserIdentity {
    /// Derive an identity deterministically from a 32-byte master seed
    /// (typically the unwrapped master key, or a dedicated identity seed
    /// stored alongside it).
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, seed);

        let mut signing_bytes = Zeroizing::new([0u8; 32]);
        hk.expand(SIGNING_INFO, signing_bytes.as_mut())
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        let signing_key = SigningKey::from_bytes(&signing_bytes);

        let mut encryption_bytes = Zeroizing::new([0u8; 32]);
        hk.expand(ENCRYPTION_INFO, encryption_bytes.as_mut())
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        let encryption_key = crypto_box::SecretKey::from(*encryption_bytes);

        Ok(Self {
            signing_key,
            encryption_key,
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_encryption_key(&self) -> crypto_box::PublicKey {
        self.encryption_key.public_key()
    }

    pub fn secret_encryption_key(&self) -> &crypto_box::SecretKey {
        &self.encryption_key
    }

    /// Sign a message, returning a 64-byte detached signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached Ed25519 signature against a public key.
pub fn verify_signature(
    signature: &[u8; 64],
    message: &[u8],
    public_key: &VerifyingKey,
) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => public_key.verify(message, &sig).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let identity = UserIdentity::from_seed(&[1u8; 32]).unwrap();
        let sig = identity.sign(b"membership entry bytes");
        assert!(verify_signature(
            &sig,
            b"membership entry bytes",
            &identity.verifying_key()
        ));
    }

    #[test]
    fn verify_fails_for_tampered_message() {
        let identity = UserIdentity::from_seed(&[1u8; 32]).unwrap();
        let sig = identity.sign(b"original");
        assert!(!verify_signature(&sig, b"tampered", &identity.verifying_key()));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = UserIdentity::from_seed(&[5u8; 32]).unwrap();
        let b = UserIdentity::from_seed(&[5u8; 32]).unwrap();
        assert_eq!(a.verifying_key(), b.verifying_key());
        assert_eq!(
            a.public_encryption_key().as_bytes(),
            b.public_encryption_key().as_bytes()
        );
    }
}
