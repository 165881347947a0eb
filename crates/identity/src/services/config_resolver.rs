//! Layered configuration resolution.
//!
//! Merges a user's raw configuration with its section defaults and the
//! global defaults, with precedence user > section > global. This is a pure
//! function over its inputs: it never consults the identity store.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::entities::defaults::{ATTRIBUTE_KEYS, GLOBAL_DEFAULTS};
use crate::entities::spec::{AttrMap, Provenance, ResolvedSpec};
use crate::types::errors::{ProvisionError, ProvisionResult};

/// Resolve one user's layered configuration into a fully populated spec.
///
/// Every key known to the global defaults table ends up defined; unknown
/// keys present in the user layer are passed through untouched. The user
/// layer must carry a non-empty `name`.
pub fn resolve(user_config: &AttrMap, section_defaults: &AttrMap) -> ProvisionResult<ResolvedSpec> {
    let name = match user_config.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(other) => {
            return Err(ProvisionError::InvalidConfig(format!(
                "user name must be a non-empty string, got {other}"
            )))
        }
        None => {
            return Err(ProvisionError::InvalidConfig(
                "user configuration must include a 'name'".to_string(),
            ))
        }
    };

    let mut merged = AttrMap::new();
    let mut provenance = BTreeMap::new();
    for key in ATTRIBUTE_KEYS {
        let (value, layer) = if let Some(value) = user_config.get(*key) {
            (value.clone(), Provenance::UserConfig)
        } else if let Some(value) = section_defaults.get(*key) {
            (value.clone(), Provenance::SectionDefault)
        } else {
            let value = GLOBAL_DEFAULTS
                .get(*key)
                .cloned()
                .unwrap_or(Value::Null);
            (value, Provenance::GlobalDefault)
        };
        debug!(%name, key, %value, layer = %layer, "resolved attribute");
        merged.insert((*key).to_string(), value);
        provenance.insert((*key).to_string(), layer);
    }

    // Unknown user keys are never silently dropped.
    let extra: AttrMap = user_config
        .iter()
        .filter(|(key, _)| key.as_str() != "name" && !ATTRIBUTE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let uid = require_u32(&merged, "uid")?;
    let uid_next_available = require_bool(&merged, "uid_next_available")?;
    let mut gid = require_u32(&merged, "gid")?;
    let gid_next_available = require_bool(&merged, "gid_next_available")?;

    // A gid nobody asked for mirrors the resolved uid; an explicit section
    // or user gid wins over the mirror rule.
    if provenance["gid"] == Provenance::GlobalDefault {
        gid = uid;
    }

    let default_groups = optional_string_set(section_defaults, "groups")?;

    Ok(ResolvedSpec {
        uid,
        uid_next_available,
        gid,
        gid_next_available,
        shell: require_string(&merged, "shell")?,
        home: optional_string(&merged, "home")?,
        create_home: require_bool(&merged, "create_home")?,
        full_name: optional_string(&merged, "full_name")?,
        password: optional_string(&merged, "password")?,
        generate_password: require_bool(&merged, "generate_password")?,
        service: require_bool(&merged, "service")?,
        ssh_key: require_bool(&merged, "ssh_key")?,
        known_hosts: require_bool(&merged, "known_hosts")?,
        groups: require_string_set(&merged, "groups")?,
        add_groups: require_string_set(&merged, "add_groups")?,
        remove_groups: require_string_set(&merged, "remove_groups")?,
        default_groups,
        provenance,
        extra,
        name,
    })
}

fn invalid(key: &str, expected: &str, value: &Value) -> ProvisionError {
    ProvisionError::InvalidConfig(format!("attribute '{key}' must be {expected}, got {value}"))
}

fn require_u32(map: &AttrMap, key: &str) -> ProvisionResult<u32> {
    let value = &map[key];
    match value {
        Value::Number(number) => number
            .as_u64()
            .and_then(|wide| u32::try_from(wide).ok())
            .ok_or_else(|| invalid(key, "an unsigned 32-bit integer", value)),
        // Environment overrides arrive stringly typed.
        Value::String(text) => text
            .parse::<u32>()
            .map_err(|_| invalid(key, "an unsigned 32-bit integer", value)),
        _ => Err(invalid(key, "an unsigned 32-bit integer", value)),
    }
}

fn require_bool(map: &AttrMap, key: &str) -> ProvisionResult<bool> {
    let value = &map[key];
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) => text
            .parse::<bool>()
            .map_err(|_| invalid(key, "a boolean", value)),
        _ => Err(invalid(key, "a boolean", value)),
    }
}

fn require_string(map: &AttrMap, key: &str) -> ProvisionResult<String> {
    match &map[key] {
        Value::String(text) => Ok(text.clone()),
        other => Err(invalid(key, "a string", other)),
    }
}

fn optional_string(map: &AttrMap, key: &str) -> ProvisionResult<Option<String>> {
    match &map[key] {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        other => Err(invalid(key, "a string or null", other)),
    }
}

fn require_string_set(map: &AttrMap, key: &str) -> ProvisionResult<BTreeSet<String>> {
    string_set(&map[key], key)
}

fn optional_string_set(map: &AttrMap, key: &str) -> ProvisionResult<BTreeSet<String>> {
    match map.get(key) {
        Some(value) => string_set(value, key),
        None => Ok(BTreeSet::new()),
    }
}

fn string_set(value: &Value, key: &str) -> ProvisionResult<BTreeSet<String>> {
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(entries) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(text) => Ok(text.clone()),
                other => Err(invalid(key, "a list of group names", other)),
            })
            .collect(),
        other => Err(invalid(key, "a list of group names", other)),
    }
}
