//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate ultimately resolves to one of the
//! kinds below (see spec §7). Leaf errors from individual modules convert
//! into it via `#[from]` so callers at the orchestrator/CLI boundary only
//! have to match on one type.
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::model::state::TransitionError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad input from the caller: empty IDs, invalid state, unknown type.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing/expired tokens, wrong password. Sync run aborts.
    #[error("auth error: {0}")]
    Auth(String),

    /// Connection/timeout/non-2xx without message. Retryable, cursor not advanced.
    #[error("network error: {0}")]
    Network(String),

    /// Key-chain or payload decryption failure. Logged per item, item skipped.
    #[error("decrypt error: {0}")]
    Decrypt(#[from] CryptoError),

    /// Invalid state transition or invariant violation. Item skipped.
    #[error("state error: {0}")]
    State(#[from] TransitionError),

    /// KV read/write/serialization failure. Fatal to the current batch.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Cloud version regression detected (cloud version < local and not
    /// deleted). Logged; item skipped (local wins).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl SyncError {
    /// Whether the sync run as a whole should abort after this error
    /// (storage failures and exhausted auth), vs. merely skip the item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Storage(_) | SyncError::Auth(_))
    }

    /// CLI exit code per spec §6: 0 success, 1 user error, 2 system error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Validation(_) | SyncError::Auth(_) => 1,
            SyncError::Network(_)
            | SyncError::Decrypt(_)
            | SyncError::State(_)
            | SyncError::Storage(_)
            | SyncError::Conflict(_) => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
