//! Identifier namespaces, assignments and the provisioning artifact.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version tag stamped onto every artifact this crate produces.
pub const ARTIFACT_SOURCE: &str = concat!("userforge v", env!("CARGO_PKG_VERSION"));

/// Numeric identifier namespaces. The UID and GID spaces are independent:
/// a value reserved in one never blocks the same value in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Uid,
    Gid,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Uid => "uid",
            IdKind::Gid => "gid",
        }
    }

    /// The named entity kind an identifier of this namespace binds to.
    pub fn entity(&self) -> EntityKind {
        match self {
            IdKind::Uid => EntityKind::User,
            IdKind::Gid => EntityKind::Group,
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named entity kinds in the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one numeric identifier for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssignment {
    pub kind: IdKind,
    pub requested_value: u32,
    pub allow_autoassign: bool,
    pub resolved_value: u32,
}

impl IdentityAssignment {
    /// True when auto-assignment moved the identifier off the requested value.
    pub fn was_moved(&self) -> bool {
        self.requested_value != self.resolved_value
    }
}

/// Durable record of a successfully provisioned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
    pub home: Option<String>,
    pub groups: BTreeSet<String>,
    pub service: bool,
    pub ssh_key: bool,
    pub known_hosts: bool,
    pub password_entropy: Option<f64>,
    pub source: String,
}
