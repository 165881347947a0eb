//! Process-wide attribute defaults, the lowest precedence configuration layer.

use once_cell::sync::Lazy;
use serde_json::json;

use super::spec::AttrMap;

/// Shell forced onto service accounts regardless of the requested shell.
pub const SERVICE_SHELL: &str = "/usr/sbin/nologin";

/// Every attribute a resolved spec must cover. Keys outside this list are
/// passed through untouched rather than silently dropped.
pub const ATTRIBUTE_KEYS: &[&str] = &[
    "uid",
    "uid_next_available",
    "gid",
    "gid_next_available",
    "shell",
    "home",
    "create_home",
    "full_name",
    "password",
    "generate_password",
    "service",
    "ssh_key",
    "known_hosts",
    "groups",
    "add_groups",
    "remove_groups",
];

/// Global defaults applied when neither the user nor the section layer
/// defines an attribute.
pub static GLOBAL_DEFAULTS: Lazy<AttrMap> = Lazy::new(|| {
    let mut map = AttrMap::new();
    map.insert("uid".to_string(), json!(1000));
    map.insert("uid_next_available".to_string(), json!(true));
    map.insert("gid".to_string(), json!(1000));
    map.insert("gid_next_available".to_string(), json!(true));
    map.insert("shell".to_string(), json!("/bin/bash"));
    map.insert("home".to_string(), json!(null));
    map.insert("create_home".to_string(), json!(true));
    map.insert("full_name".to_string(), json!(null));
    map.insert("password".to_string(), json!(null));
    map.insert("generate_password".to_string(), json!(false));
    map.insert("service".to_string(), json!(false));
    map.insert("ssh_key".to_string(), json!(false));
    map.insert("known_hosts".to_string(), json!(false));
    map.insert("groups".to_string(), json!([]));
    map.insert("add_groups".to_string(), json!([]));
    map.insert("remove_groups".to_string(), json!([]));
    map
});
