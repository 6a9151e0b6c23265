//! The Reconciler (spec §4.E): per-item decision between a locally-known
//! entity and the version the cloud just returned.
//!
//! Grounded on the teacher's `sync::conflict` (`lww_conflict_handler`) and
//! `sync::apply`, generalized over both entity kinds through the
//! `SyncEnvelope` capability trait (spec §9) instead of a shared base type.
use tracing::{debug, warn};

use crate::model::state::is_tombstoned;
use crate::model::SyncEnvelope;

/// What the Reconciler decided to do with one incoming item (spec §4.E
/// steps 2-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No local copy existed and the remote isn't a tombstone: fetch,
    /// decrypt, and materialize it locally.
    Applied,
    /// A local copy exists and the remote strictly dominates it: overwrite
    /// the local copy with the remote one.
    Updated,
    /// The remote is a tombstone for an item that exists locally: remove
    /// the local copy entirely.
    Tombstoned,
    /// No local copy existed and the remote is already a tombstone, or the
    /// local copy is already at least as new as the remote: nothing to do.
    NoOp,
    /// The remote version regressed relative to local and the remote copy
    /// isn't a tombstone (spec §7 "conflict"): local wins, logged, nothing
    /// applied. Functionally a no-op, named separately so it can be
    /// reported and counted on its own.
    Conflict,
}

impl ReconcileOutcome {
    /// Whether this outcome means "write the remote item into local
    /// storage" (as opposed to leaving storage untouched or deleting).
    pub fn materializes(self) -> bool {
        matches!(self, ReconcileOutcome::Applied | ReconcileOutcome::Updated)
    }
}

/// Decide what to do with one cloud item `remote` given the locally-known
/// copy `local` (or `None` if this id hasn't been seen before), per spec
/// §4.E steps 2-3.
pub fn reconcile<L, R>(local: Option<&L>, remote: &R) -> ReconcileOutcome
where
    L: SyncEnvelope,
    R: SyncEnvelope,
{
    let remote_is_tombstone =
        is_tombstoned(remote.state(), remote.version(), remote.tombstone_version());

    let Some(local) = local else {
        return if remote_is_tombstone {
            debug!("tombstone for an id with no local copy, skipping");
            ReconcileOutcome::NoOp
        } else {
            ReconcileOutcome::Applied
        };
    };

    if remote.tombstone_version() > local.version() || remote_is_tombstone {
        debug!("remote tombstone dominates local copy, deleting");
        return ReconcileOutcome::Tombstoned;
    }

    match local.version().cmp(&remote.version()) {
        std::cmp::Ordering::Less => ReconcileOutcome::Updated,
        std::cmp::Ordering::Equal => ReconcileOutcome::NoOp,
        std::cmp::Ordering::Greater => {
            warn!(
                local_version = local.version(),
                remote_version = remote.version(),
                "remote version regressed and is not a tombstone, local wins"
            );
            ReconcileOutcome::Conflict
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::EntityState;
    use chrono::Utc;

    #[derive(Clone)]
    struct Stub {
        version: u64,
        state: EntityState,
        tombstone_version: u64,
    }

    impl SyncEnvelope for Stub {
        fn version(&self) -> u64 {
            self.version
        }
        fn state(&self) -> EntityState {
            self.state
        }
        fn tombstone_version(&self) -> u64 {
            self.tombstone_version
        }
        fn modified_at(&self) -> chrono::DateTime<Utc> {
            Utc::now()
        }
    }

    fn stub(version: u64, state: EntityState, tombstone_version: u64) -> Stub {
        Stub {
            version,
            state,
            tombstone_version,
        }
    }

    #[test]
    fn scenario_1_no_local_copy_applies() {
        let remote = stub(1, EntityState::Active, 0);
        assert_eq!(
            reconcile::<Stub, _>(None, &remote),
            ReconcileOutcome::Applied
        );
    }

    #[test]
    fn no_local_copy_and_already_tombstoned_is_a_no_op() {
        let remote = stub(4, EntityState::Deleted, 4);
        assert_eq!(
            reconcile::<Stub, _>(None, &remote),
            ReconcileOutcome::NoOp
        );
    }

    #[test]
    fn scenario_2_remote_newer_version_updates() {
        let local = stub(1, EntityState::Active, 0);
        let remote = stub(2, EntityState::Active, 0);
        assert_eq!(
            reconcile(Some(&local), &remote),
            ReconcileOutcome::Updated
        );
    }

    #[test]
    fn p2_equal_versions_is_a_no_op() {
        let local = stub(3, EntityState::Active, 0);
        let remote = stub(3, EntityState::Active, 0);
        assert_eq!(reconcile(Some(&local), &remote), ReconcileOutcome::NoOp);
    }

    #[test]
    fn scenario_3_remote_tombstone_removes_local_copy() {
        let local = stub(2, EntityState::Active, 0);
        let remote = stub(2, EntityState::Deleted, 3);
        assert_eq!(
            reconcile(Some(&local), &remote),
            ReconcileOutcome::Tombstoned
        );
    }

    #[test]
    fn p3_remote_tombstone_dominates_even_with_lower_version() {
        let local = stub(5, EntityState::Active, 0);
        let remote = stub(4, EntityState::Deleted, 4);
        assert_eq!(
            reconcile(Some(&local), &remote),
            ReconcileOutcome::Tombstoned
        );
    }

    #[test]
    fn p7_remote_regression_without_tombstone_is_a_conflict() {
        let local = stub(5, EntityState::Active, 0);
        let remote = stub(4, EntityState::Active, 0);
        assert_eq!(
            reconcile(Some(&local), &remote),
            ReconcileOutcome::Conflict
        );
    }
}
