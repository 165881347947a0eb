//! Domain entities for identity resolution.

pub mod defaults;
pub mod identity;
pub mod section;
pub mod spec;

pub use defaults::{ATTRIBUTE_KEYS, GLOBAL_DEFAULTS, SERVICE_SHELL};
pub use identity::{EntityKind, IdKind, IdentityAssignment, ResolvedIdentity};
pub use section::{SectionConfig, SectionsDocument};
pub use spec::{AttrMap, Provenance, ResolvedSpec};
