//! Resolved user specifications and raw configuration layers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::SERVICE_SHELL;

/// One declarative configuration layer: attribute name to raw value.
pub type AttrMap = BTreeMap<String, Value>;

/// Which layer supplied a resolved attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    UserConfig,
    SectionDefault,
    GlobalDefault,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::UserConfig => "user config",
            Provenance::SectionDefault => "section default",
            Provenance::GlobalDefault => "global default",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved identity specification for one user.
///
/// Every attribute known to the global defaults table is populated; the
/// `provenance` map records which layer supplied each one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    pub name: String,
    pub uid: u32,
    pub uid_next_available: bool,
    pub gid: u32,
    pub gid_next_available: bool,
    pub shell: String,
    pub home: Option<String>,
    pub create_home: bool,
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub generate_password: bool,
    pub service: bool,
    pub ssh_key: bool,
    pub known_hosts: bool,
    pub groups: BTreeSet<String>,
    pub add_groups: BTreeSet<String>,
    pub remove_groups: BTreeSet<String>,
    /// Groups contributed by the section defaults layer, kept separate from
    /// the merged `groups` attribute for the membership algebra.
    pub default_groups: BTreeSet<String>,
    /// Layer that supplied each known attribute, for diagnostics.
    pub provenance: BTreeMap<String, Provenance>,
    /// Unknown user-supplied keys, passed through untouched.
    pub extra: AttrMap,
}

impl ResolvedSpec {
    /// Service accounts get no login shell, home, password or SSH material.
    pub fn is_service_account(&self) -> bool {
        self.service
    }

    pub fn provenance_of(&self, key: &str) -> Option<Provenance> {
        self.provenance.get(key).copied()
    }

    /// Shell to actually apply; service accounts are pinned to nologin.
    pub fn effective_shell(&self) -> &str {
        if self.service {
            SERVICE_SHELL
        } else {
            &self.shell
        }
    }

    /// Home directory to apply, if any. Service accounts get none; other
    /// users fall back to `/home/<name>` when `create_home` is set.
    pub fn effective_home(&self) -> Option<String> {
        if self.service {
            return None;
        }
        match &self.home {
            Some(home) => Some(home.clone()),
            None if self.create_home => Some(format!("/home/{}", self.name)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec() -> ResolvedSpec {
        ResolvedSpec {
            name: "alice".to_string(),
            uid: 1000,
            uid_next_available: true,
            gid: 1000,
            gid_next_available: true,
            shell: "/bin/bash".to_string(),
            home: None,
            create_home: true,
            full_name: None,
            password: None,
            generate_password: false,
            service: false,
            ssh_key: false,
            known_hosts: false,
            groups: BTreeSet::new(),
            add_groups: BTreeSet::new(),
            remove_groups: BTreeSet::new(),
            default_groups: BTreeSet::new(),
            provenance: BTreeMap::new(),
            extra: AttrMap::new(),
        }
    }

    #[test]
    fn service_accounts_pin_shell_and_drop_home() {
        let mut spec = minimal_spec();
        spec.service = true;
        spec.shell = "/bin/zsh".to_string();
        spec.home = Some("/srv/alice".to_string());

        assert_eq!(spec.effective_shell(), SERVICE_SHELL);
        assert_eq!(spec.effective_home(), None);
    }

    #[test]
    fn default_home_follows_username() {
        let spec = minimal_spec();
        assert_eq!(spec.effective_home(), Some("/home/alice".to_string()));
    }

    #[test]
    fn no_home_without_create_home() {
        let mut spec = minimal_spec();
        spec.create_home = false;
        assert_eq!(spec.effective_home(), None);

        spec.home = Some("/data/alice".to_string());
        assert_eq!(spec.effective_home(), Some("/data/alice".to_string()));
    }
}
