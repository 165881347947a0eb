//! Error types for identity resolution and provisioning.

use thiserror::Error;

use crate::entities::identity::IdKind;

/// Errors raised while resolving and provisioning a single identity.
///
/// Everything except `Unrecoverable` is caught at the per-user boundary and
/// turned into a FAIL outcome; `Unrecoverable` aborts the remaining batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProvisionError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested identifier is bound elsewhere and auto-assignment is
    /// disallowed. Carries the next free candidate so callers can resolve
    /// the conflict by policy instead of re-prompting.
    #[error("{kind} {requested} is already in use and auto-assignment is disabled (next free: {next_free})")]
    IdentifierConflict {
        kind: IdKind,
        requested: u32,
        next_free: u32,
    },

    #[error("mutation failed: {0}")]
    MutationFailure(String),

    #[error("unrecoverable collaborator failure: {0}")]
    Unrecoverable(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors surfaced by identity store adapters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("identity store query failed: {0}")]
    Query(String),

    #[error("identity mutation failed: {0}")]
    Mutation(String),

    /// The privilege required to mutate identities is gone; nothing else in
    /// the batch can succeed.
    #[error("privileged mutation unavailable: {0}")]
    PrivilegeLost(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ProvisionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Mutation(message) => ProvisionError::MutationFailure(message),
            StoreError::Query(message) | StoreError::PrivilegeLost(message) => {
                ProvisionError::Unrecoverable(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_namespace() {
        let err = ProvisionError::IdentifierConflict {
            kind: IdKind::Gid,
            requested: 1000,
            next_free: 1001,
        };
        assert_eq!(
            err.to_string(),
            "gid 1000 is already in use and auto-assignment is disabled (next free: 1001)"
        );
    }

    #[test]
    fn store_errors_map_onto_provision_errors() {
        let mutation: ProvisionError = StoreError::Mutation("usermod exited with 1".into()).into();
        assert!(matches!(mutation, ProvisionError::MutationFailure(_)));

        let privilege: ProvisionError = StoreError::PrivilegeLost("sudo unavailable".into()).into();
        assert!(matches!(privilege, ProvisionError::Unrecoverable(_)));

        let query: ProvisionError = StoreError::Query("passwd unreadable".into()).into();
        assert!(matches!(query, ProvisionError::Unrecoverable(_)));
    }
}
