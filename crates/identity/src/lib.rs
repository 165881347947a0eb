//! # Userforge Identity Crate
//!
//! This crate is the resolution core of userforge. It turns layered,
//! declarative user definitions into concrete, conflict-free identity
//! attributes (UID, GID, shell, home, group memberships) and defines the
//! seams through which the surrounding system queries and mutates the
//! underlying identity store.
//!
//! ## Architecture
//!
//! - **Entities**: domain records (resolved specs, assignments, artifacts,
//!   the sections document)
//! - **Services**: the leaf resolvers (configuration merge, group set
//!   algebra, identifier allocation)
//! - **Store**: identity-store query/mutation traits plus the in-memory and
//!   live system adapters
//! - **Types**: errors, structured events, collaborator contracts
//! - **Utils**: name validation helpers

pub mod entities;
pub mod services;
pub mod store;
pub mod types;
pub mod utils;

pub use entities::defaults::{ATTRIBUTE_KEYS, GLOBAL_DEFAULTS, SERVICE_SHELL};
pub use entities::identity::{EntityKind, IdKind, IdentityAssignment, ResolvedIdentity};
pub use entities::section::{SectionConfig, SectionsDocument};
pub use entities::spec::{AttrMap, Provenance, ResolvedSpec};
pub use services::allocator::{allocate, ReservationSet};
pub use services::config_resolver::resolve as resolve_config;
pub use services::group_resolver::{resolve as resolve_groups, GroupResolution};
pub use store::{IdentityMutator, IdentityStore};
pub use types::errors::{ProvisionError, ProvisionResult, StoreError, StoreResult};
pub use types::events::{EventSink, ProvisionEvent, RecordingSink, TracingSink};
pub use types::policy::{ConflictPolicy, MissingGroupPolicy, PasswordPolicy};
