//! Name validation against identity-store naming rules.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::errors::{ProvisionError, ProvisionResult};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_-]*\$?$").expect("name pattern must compile"));

const MAX_NAME_LENGTH: usize = 32;

/// Validate a username against the portable useradd rules.
pub fn validate_username(name: &str) -> ProvisionResult<()> {
    validate_name(name, "username")
}

/// Validate a group name against the portable groupadd rules.
pub fn validate_group_name(name: &str) -> ProvisionResult<()> {
    validate_name(name, "group name")
}

fn validate_name(name: &str, label: &str) -> ProvisionResult<()> {
    if name.is_empty() {
        return Err(ProvisionError::InvalidConfig(format!(
            "{label} cannot be empty"
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(ProvisionError::InvalidConfig(format!(
            "{label} '{name}' exceeds {MAX_NAME_LENGTH} characters"
        )));
    }

    if !NAME_PATTERN.is_match(name) {
        return Err(ProvisionError::InvalidConfig(format!(
            "{label} '{name}' may only contain lowercase letters, digits, underscores and hyphens, and must not start with a digit or hyphen"
        )));
    }

    Ok(())
}
