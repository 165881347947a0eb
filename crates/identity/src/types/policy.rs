//! Collaborator contracts and resolution policies.

use serde::{Deserialize, Serialize};

use super::errors::ProvisionResult;

/// How to handle a requested identifier that is already taken when
/// auto-assignment was not asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Report the conflict as a failure for that user.
    #[default]
    Fail,
    /// Take the next free identifier instead.
    AutoAssign,
}

/// How to handle a resolved group membership whose group does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingGroupPolicy {
    /// Create the group with an auto-assigned identifier.
    #[default]
    Create,
    /// Drop the membership and continue.
    Skip,
    /// Report a failure for that user.
    Fail,
}

/// Password policy collaborator. The core only invokes it and never
/// re-implements its rules.
pub trait PasswordPolicy {
    /// Produce a password satisfying the policy.
    fn generate(&self) -> ProvisionResult<String>;

    /// Whether an externally supplied password satisfies the policy.
    fn validate(&self, password: &str) -> bool;

    /// Estimated entropy of a password, in bits.
    fn estimate_entropy(&self, password: &str) -> f64;
}
