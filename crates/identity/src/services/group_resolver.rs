//! Group membership set algebra.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entities::spec::ResolvedSpec;

/// Final group membership: `(defaults ∪ base ∪ add) − remove`.
///
/// Set semantics throughout: duplicates collapse and input ordering never
/// affects the result. An empty resolved set is valid and means no
/// memberships beyond the primary group.
pub fn resolve(
    defaults: &BTreeSet<String>,
    base: &BTreeSet<String>,
    add: &BTreeSet<String>,
    remove: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut resolved: BTreeSet<String> = defaults.union(base).cloned().collect();
    resolved.extend(add.iter().cloned());
    for name in remove {
        resolved.remove(name);
    }
    resolved
}

/// The four input sets and the resolved membership, kept together for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResolution {
    pub defaults: BTreeSet<String>,
    pub base: BTreeSet<String>,
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
    pub resolved: BTreeSet<String>,
}

impl GroupResolution {
    pub fn from_spec(spec: &ResolvedSpec) -> Self {
        let resolved = resolve(
            &spec.default_groups,
            &spec.groups,
            &spec.add_groups,
            &spec.remove_groups,
        );
        Self {
            defaults: spec.default_groups.clone(),
            base: spec.groups.clone(),
            add: spec.add_groups.clone(),
            remove: spec.remove_groups.clone(),
            resolved,
        }
    }
}
