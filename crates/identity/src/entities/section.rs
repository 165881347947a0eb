//! The sections document: named groups of user definitions sharing defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::spec::AttrMap;

/// Section name treated as a template and never provisioned.
pub const TEMPLATE_SECTION: &str = "example";

/// One named section: a defaults layer plus the users it applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Defaults applied to every user in the section.
    #[serde(default, alias = "default")]
    pub defaults: AttrMap,
    #[serde(default)]
    pub users: BTreeMap<String, AttrMap>,
}

/// A whole inventory: section name to section configuration.
///
/// Sections and users are processed in name order, which is deterministic
/// for a given document and is what makes batch-scoped identifier
/// reservation reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionsDocument {
    pub sections: BTreeMap<String, SectionConfig>,
}

impl SectionsDocument {
    /// Sections eligible for provisioning, skipping the template section
    /// (matched case-insensitively).
    pub fn provisionable(&self) -> impl Iterator<Item = (&str, &SectionConfig)> {
        self.sections
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(TEMPLATE_SECTION))
            .map(|(name, section)| (name.as_str(), section))
    }

    pub fn get(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.get(name)
    }

    /// Total number of users across provisionable sections.
    pub fn user_count(&self) -> usize {
        self.provisionable()
            .map(|(_, section)| section.users.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section_with_user(user: &str) -> SectionConfig {
        let mut users = BTreeMap::new();
        users.insert(user.to_string(), AttrMap::new());
        SectionConfig {
            defaults: AttrMap::new(),
            users,
        }
    }

    #[test]
    fn template_section_is_skipped_case_insensitively() {
        let mut sections = BTreeMap::new();
        sections.insert("Example".to_string(), section_with_user("ignored"));
        sections.insert("infra".to_string(), section_with_user("svc-a"));
        let document = SectionsDocument { sections };

        let names: Vec<&str> = document.provisionable().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["infra"]);
        assert_eq!(document.user_count(), 1);
    }

    #[test]
    fn deserializes_from_a_plain_mapping() {
        let raw = json!({
            "infra": {
                "defaults": { "groups": ["infra"] },
                "users": { "svc-a": { "service": true } }
            }
        });

        let document: SectionsDocument = serde_json::from_value(raw).unwrap();
        let section = document.get("infra").unwrap();
        assert_eq!(section.defaults["groups"], json!(["infra"]));
        assert_eq!(section.users["svc-a"]["service"], json!(true));
    }

    #[test]
    fn accepts_the_singular_defaults_alias() {
        let raw = json!({
            "dev": {
                "default": { "shell": "/bin/zsh" },
                "users": {}
            }
        });

        let document: SectionsDocument = serde_json::from_value(raw).unwrap();
        let section = document.get("dev").unwrap();
        assert_eq!(section.defaults["shell"], json!("/bin/zsh"));
    }
}
