//! Identity store seams: read-only queries and privileged mutations.

pub mod memory;
pub mod system;

pub use memory::MemoryStore;
pub use system::{SystemMutator, SystemStore};

use crate::entities::identity::{EntityKind, IdKind};
use crate::types::errors::StoreResult;

/// Read-only view of the underlying identity store.
///
/// Implementations must reflect the live state at call time; the core never
/// caches answers across a batch, only the reservation set it owns itself.
pub trait IdentityStore {
    /// Whether a user or group with this name exists.
    fn exists(&self, name: &str, kind: EntityKind) -> StoreResult<bool>;

    /// The identifier currently bound to a named identity, if any.
    fn identifier_bound_to(&self, name: &str, kind: IdKind) -> StoreResult<Option<u32>>;

    /// Whether a numeric identifier is bound to any identity in its namespace.
    fn identifier_in_use(&self, value: u32, kind: IdKind) -> StoreResult<bool>;
}

/// Privileged mutation interface. Each call either takes effect or fails;
/// callers decide how failures propagate.
pub trait IdentityMutator {
    /// Create the named user, or update an existing one, with the given
    /// identifiers, shell and optional home directory.
    fn create_or_modify_identity(
        &mut self,
        name: &str,
        uid: u32,
        gid: u32,
        shell: &str,
        home: Option<&str>,
    ) -> StoreResult<()>;

    /// Create a group; `gid` of `None` lets the store pick one.
    fn create_group(&mut self, name: &str, gid: Option<u32>) -> StoreResult<()>;

    fn add_to_group(&mut self, name: &str, group: &str) -> StoreResult<()>;

    fn set_password(&mut self, name: &str, password: &str) -> StoreResult<()>;

    fn set_full_name(&mut self, name: &str, full_name: &str) -> StoreResult<()>;

    fn generate_ssh_key(&mut self, name: &str, home: &str) -> StoreResult<()>;

    fn install_known_hosts(&mut self, name: &str, home: &str, source: &str) -> StoreResult<()>;

    /// Remove a user and its home directory.
    fn remove_identity(&mut self, name: &str) -> StoreResult<()>;
}
