//! State machine for collections and files (spec §4.D).
//!
//! Pure functions over an enum, in the same spirit as the teacher's
//! `lww_conflict_handler` -- no object, just a graph check.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Active,
    Deleted,
    Archived,
}

impl Default for EntityState {
    fn default() -> Self {
        EntityState::Active
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid state: {0:?}")]
    InvalidState(String),
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: EntityState,
        to: EntityState,
    },
}

/// `ValidateState` (spec §4.D).
pub fn validate_state(raw: &str) -> Result<EntityState, TransitionError> {
    match raw {
        "active" => Ok(EntityState::Active),
        "deleted" => Ok(EntityState::Deleted),
        "archived" => Ok(EntityState::Archived),
        other => Err(TransitionError::InvalidState(other.to_string())),
    }
}

/// `IsValidStateTransition` (spec §4.D, invariant 5).
///
/// Legal edges: active <-> deleted, active <-> archived, deleted -> archived,
/// archived -> active. No other transitions are legal.
pub fn is_valid_state_transition(from: EntityState, to: EntityState) -> bool {
    use EntityState::*;
    matches!(
        (from, to),
        (Active, Deleted)
            | (Deleted, Active)
            | (Active, Archived)
            | (Archived, Active)
            | (Deleted, Archived)
    )
}

/// Validates a transition, returning the typed error spec §4.D demands.
pub fn check_transition(from: EntityState, to: EntityState) -> Result<(), TransitionError> {
    if from == to {
        // Self-transitions (e.g. active -> active) are not in the legal
        // edge set and must be rejected explicitly (spec §8 scenario 6).
        return Err(TransitionError::InvalidTransition { from, to });
    }
    if is_valid_state_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

/// Whether an entity should be treated as deleted by readers (invariant 2):
/// `tombstone_version > 0 && tombstone_version > version`, OR `state == deleted`.
/// Both representations are treated identically.
pub fn is_tombstoned(state: EntityState, version: u64, tombstone_version: u64) -> bool {
    state == EntityState::Deleted || (tombstone_version > 0 && tombstone_version > version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_for_new_entities_is_active() {
        assert_eq!(EntityState::default(), EntityState::Active);
    }

    #[test]
    fn validate_state_rejects_unknown() {
        assert!(validate_state("frobnicated").is_err());
        assert_eq!(validate_state("archived").unwrap(), EntityState::Archived);
    }

    #[test]
    fn p5_state_transition_closure() {
        use EntityState::*;
        let legal = [
            (Active, Deleted),
            (Deleted, Active),
            (Active, Archived),
            (Archived, Active),
            (Deleted, Archived),
        ];
        for (from, to) in legal {
            assert!(check_transition(from, to).is_ok(), "{from:?}->{to:?}");
        }
        // archived -> deleted is not in the legal edge set.
        assert!(check_transition(Archived, Deleted).is_err());
    }

    #[test]
    fn scenario_6_state_transition_rejection() {
        use EntityState::*;
        // A deleted collection receives restore -> active: succeeds.
        assert!(check_transition(Deleted, Active).is_ok());
        // A second active -> active request must fail.
        assert_eq!(
            check_transition(Active, Active),
            Err(TransitionError::InvalidTransition {
                from: Active,
                to: Active
            })
        );
    }

    #[test]
    fn p3_tombstone_dominance() {
        assert!(is_tombstoned(EntityState::Active, 5, 6));
        assert!(!is_tombstoned(EntityState::Active, 6, 6));
        assert!(is_tombstoned(EntityState::Deleted, 6, 0));
    }
}
