//! Tree (keyspace) names and key-encoding helpers for the Local Entity Store.

/// Collections, keyed by their canonical id string.
pub const COLLECTIONS: &str = "collections";
/// Files, keyed by their canonical id string.
pub const FILES: &str = "files";
/// The single-row sync cursor state (spec §3 `SyncState`).
pub const SYNC_STATE: &str = "sync_state";
/// The single local user record.
pub const USER: &str = "user";

/// Key under which the (sole) `SyncState` row and the (sole) `User` row are
/// stored in their respective single-row trees.
pub const SINGLETON_KEY: &[u8] = b"singleton";

/// Encode a `(modified_at, id)` pair as a key that sorts in the same order
/// as the pair itself (spec §4.E: ascending, tie-broken lexicographically
/// on id). RFC 3339 timestamps with a zero-padded nanosecond field sort
/// identically to their chronological order as raw bytes.
pub fn sort_key(modified_at: chrono::DateTime<chrono::Utc>, id: &str) -> Vec<u8> {
    let mut key = format!("{}\u{0}{}", modified_at.to_rfc3339(), id).into_bytes();
    key.shrink_to_fit();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sort_key_orders_by_timestamp_then_id() {
        let t0 = chrono::Utc::now();
        let t1 = t0 + Duration::seconds(1);

        let a = sort_key(t0, "z");
        let b = sort_key(t0, "a");
        let c = sort_key(t1, "a");

        assert!(b < a, "same timestamp: id breaks the tie lexicographically");
        assert!(a < c, "earlier timestamp sorts first regardless of id");
    }
}
