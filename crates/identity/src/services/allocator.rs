//! Numeric identifier allocation with batch-scoped reservations.
//!
//! The allocator is a pure function over the requested value, a live store
//! snapshot and the reservation set owned by the caller; it never mutates
//! the store itself. Reserving even deferred allocations is what stops two
//! users in one batch from independently discovering the same free value.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::entities::identity::{IdKind, IdentityAssignment};
use crate::store::IdentityStore;
use crate::types::errors::{ProvisionError, ProvisionResult};

/// Identifiers handed out earlier in the current batch. The UID and GID
/// spaces are tracked independently. Discarded at the end of a batch run.
#[derive(Debug, Default, Clone)]
pub struct ReservationSet {
    uids: BTreeSet<u32>,
    gids: BTreeSet<u32>,
}

impl ReservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: IdKind, value: u32) -> bool {
        self.space(kind).contains(&value)
    }

    pub fn reserve(&mut self, kind: IdKind, value: u32) -> bool {
        self.space_mut(kind).insert(value)
    }

    pub fn len(&self) -> usize {
        self.uids.len() + self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty() && self.gids.is_empty()
    }

    fn space(&self, kind: IdKind) -> &BTreeSet<u32> {
        match kind {
            IdKind::Uid => &self.uids,
            IdKind::Gid => &self.gids,
        }
    }

    fn space_mut(&mut self, kind: IdKind) -> &mut BTreeSet<u32> {
        match kind {
            IdKind::Uid => &mut self.uids,
            IdKind::Gid => &mut self.gids,
        }
    }
}

/// Resolve a numeric identifier for `name`, reserving the result.
///
/// An identifier the store already binds to this very identity is returned
/// unchanged (idempotent re-run). Otherwise the requested value is taken if
/// free, auto-assignment scans upward when allowed, and a taken value with
/// auto-assignment disallowed fails with a conflict carrying the next free
/// candidate.
pub fn allocate<S: IdentityStore + ?Sized>(
    store: &S,
    kind: IdKind,
    name: &str,
    requested: u32,
    allow_autoassign: bool,
    reservations: &mut ReservationSet,
) -> ProvisionResult<IdentityAssignment> {
    let assignment = |resolved: u32| IdentityAssignment {
        kind,
        requested_value: requested,
        allow_autoassign,
        resolved_value: resolved,
    };

    if store.identifier_bound_to(name, kind)? == Some(requested) {
        debug!(%name, %kind, value = requested, "identifier already assigned, no changes needed");
        reservations.reserve(kind, requested);
        return Ok(assignment(requested));
    }

    if is_free(store, reservations, kind, requested)? {
        reservations.reserve(kind, requested);
        debug!(%name, %kind, value = requested, "identifier is available");
        return Ok(assignment(requested));
    }

    if !allow_autoassign {
        let next_free = next_available(store, reservations, kind, requested)?;
        warn!(%name, %kind, value = requested, next_free, "identifier taken and auto-assignment disabled");
        return Err(ProvisionError::IdentifierConflict {
            kind,
            requested,
            next_free,
        });
    }

    let resolved = next_available(store, reservations, kind, requested)?;
    reservations.reserve(kind, resolved);
    info!(%name, %kind, requested, resolved, "auto-assigned next available identifier");
    Ok(assignment(resolved))
}

fn is_free<S: IdentityStore + ?Sized>(
    store: &S,
    reservations: &ReservationSet,
    kind: IdKind,
    value: u32,
) -> ProvisionResult<bool> {
    Ok(!store.identifier_in_use(value, kind)? && !reservations.contains(kind, value))
}

fn next_available<S: IdentityStore + ?Sized>(
    store: &S,
    reservations: &ReservationSet,
    kind: IdKind,
    from: u32,
) -> ProvisionResult<u32> {
    let mut candidate = from;
    while !is_free(store, reservations, kind, candidate)? {
        candidate = candidate.checked_add(1).ok_or_else(|| {
            ProvisionError::Unrecoverable(format!("{kind} namespace exhausted above {from}"))
        })?;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn free_identifier_is_taken_and_reserved() {
        let store = MemoryStore::new();
        let mut reservations = ReservationSet::new();

        let assignment =
            allocate(&store, IdKind::Uid, "alice", 1000, false, &mut reservations).unwrap();
        assert_eq!(assignment.resolved_value, 1000);
        assert!(!assignment.was_moved());
        assert!(reservations.contains(IdKind::Uid, 1000));
    }

    #[test]
    fn reservation_blocks_reuse_within_a_batch() {
        let store = MemoryStore::new();
        let mut reservations = ReservationSet::new();

        let first = allocate(&store, IdKind::Uid, "alice", 1000, true, &mut reservations).unwrap();
        let second = allocate(&store, IdKind::Uid, "bob", 1000, true, &mut reservations).unwrap();
        assert_eq!(first.resolved_value, 1000);
        assert_eq!(second.resolved_value, 1001);
    }

    #[test]
    fn conflict_without_autoassign_reports_next_candidate() {
        let store = MemoryStore::new();
        store.seed_user("carol", 1000, 1000);
        let mut reservations = ReservationSet::new();

        let err =
            allocate(&store, IdKind::Uid, "alice", 1000, false, &mut reservations).unwrap_err();
        match err {
            ProvisionError::IdentifierConflict {
                kind,
                requested,
                next_free,
            } => {
                assert_eq!(kind, IdKind::Uid);
                assert_eq!(requested, 1000);
                assert_eq!(next_free, 1001);
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
        assert!(!reservations.contains(IdKind::Uid, 1000));
    }

    #[test]
    fn autoassign_skips_store_and_reservation_collisions() {
        let store = MemoryStore::new();
        store.seed_user("carol", 1001, 1001);
        let mut reservations = ReservationSet::new();
        reservations.reserve(IdKind::Uid, 1000);

        let assignment =
            allocate(&store, IdKind::Uid, "alice", 1000, true, &mut reservations).unwrap();
        assert_eq!(assignment.resolved_value, 1002);
        assert!(assignment.was_moved());
    }

    #[test]
    fn rerun_with_identifier_already_bound_is_idempotent() {
        let store = MemoryStore::new();
        store.seed_user("alice", 1000, 1000);
        let mut reservations = ReservationSet::new();

        let assignment =
            allocate(&store, IdKind::Uid, "alice", 1000, false, &mut reservations).unwrap();
        assert_eq!(assignment.resolved_value, 1000);
        assert!(store.mutation_calls().is_empty());
    }

    #[test]
    fn uid_and_gid_spaces_are_independent() {
        let store = MemoryStore::new();
        let mut reservations = ReservationSet::new();
        reservations.reserve(IdKind::Uid, 1000);

        let assignment =
            allocate(&store, IdKind::Gid, "alice", 1000, false, &mut reservations).unwrap();
        assert_eq!(assignment.resolved_value, 1000);
        assert!(reservations.contains(IdKind::Gid, 1000));
    }
}
