//! The local user record: identity material and session tokens (spec §3).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;
use crate::crypto::Sealed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,

    pub password_salt: [u8; 16],
    /// `master_key`, sealed under the KEK derived from the user's password.
    pub encrypted_master_key: Sealed,

    /// Public halves of the identity derived from the master key
    /// (spec §4.B / `crypto::identity`); persisted so peers can be told
    /// who to seal a share for without re-deriving anything.
    pub signing_public_key: [u8; 32],
    pub encryption_public_key: [u8; 32],

    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_logged_in(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.access_token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }

    /// A refresh token exists and hasn't expired, so a 401 can attempt a
    /// silent refresh before giving up (spec §4.D).
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }
}
