//! Test plan for the `userforge-config` crate.
//!
//! Exercises the settings loader across default handling, file discovery and
//! environment overrides, plus the inventory loader.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use userforge_config::{load, load_inventory, AppConfig};
use userforge_identity::{ConflictPolicy, MissingGroupPolicy};

const ENV_VARS_TO_RESET: &[&str] = &[
    "USERFORGE_CONFIG",
    "USERFORGE__INVENTORY__PATH",
    "USERFORGE__PROVISION__CONFLICT_POLICY",
    "USERFORGE__PROVISION__MISSING_GROUP_POLICY",
    "USERFORGE__PROVISION__KNOWN_HOSTS_SOURCE",
    "USERFORGE__PASSWORD__MIN_LENGTH",
    "USERFORGE__PASSWORD__MINIMUM_ENTROPY",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create directories");
    }
    fs::write(path, contents).expect("failed to write file");
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.inventory.path, defaults.inventory.path);
    assert_eq!(config.provision.conflict_policy, ConflictPolicy::Fail);
    assert_eq!(
        config.provision.missing_group_policy,
        MissingGroupPolicy::Create
    );
    assert_eq!(
        config.provision.known_hosts_source,
        defaults.provision.known_hosts_source
    );
    assert_eq!(config.password.min_length, defaults.password.min_length);
    assert_eq!(
        config.password.minimum_entropy,
        defaults.password.minimum_entropy
    );
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_file(
        temp_dir.path(),
        "userforge.toml",
        r#"
        [inventory]
        path = "inventories/prod.yaml"

        [password]
        minimum_entropy = 80.0
        "#,
    );

    let config = load().expect("configuration load should succeed");
    assert_eq!(config.inventory.path, "inventories/prod.yaml");
    assert_eq!(config.password.minimum_entropy, 80.0);
    assert_eq!(config.password.min_length, AppConfig::default().password.min_length);
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_file(
        temp_dir.path(),
        "userforge.toml",
        r#"
        [inventory]
        path = "first.yaml"
        "#,
    );
    write_file(
        temp_dir.path(),
        "config/userforge.toml",
        r#"
        [inventory]
        path = "second.yaml"
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.inventory.path, "first.yaml");
}

#[test]
#[serial]
fn load_honours_explicit_config_path() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_file(
        temp_dir.path(),
        "elsewhere/settings.toml",
        r#"
        [provision]
        known_hosts_source = "/srv/known_hosts"
        "#,
    );
    ctx.set_var(
        "USERFORGE_CONFIG",
        temp_dir.path().join("elsewhere/settings.toml").display().to_string(),
    );

    let config = load().expect("configuration load should honour USERFORGE_CONFIG");
    assert_eq!(config.provision.known_hosts_source, "/srv/known_hosts");
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_file(
        temp_dir.path(),
        "userforge.toml",
        r#"
        [provision]
        conflict_policy = "fail"
        "#,
    );
    ctx.set_var("USERFORGE__PROVISION__CONFLICT_POLICY", "auto_assign");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.provision.conflict_policy, ConflictPolicy::AutoAssign);
}

#[test]
#[serial]
fn load_errors_on_invalid_file_contents() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_file(
        temp_dir.path(),
        "userforge.toml",
        r#"
        [provision]
        conflict_policy = "ask-a-human"
        "#,
    );

    let error = load().expect_err("unknown policy should cause load to fail");
    assert!(
        error.to_string().contains("invalid configuration"),
        "unexpected error message: {error}"
    );
}

#[test]
fn inventory_loads_sections_users_and_defaults() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    write_file(
        temp_dir.path(),
        "users.yaml",
        r#"
example:
  defaults:
    shell: /bin/sh
  users:
    template-user: {}

infra:
  defaults:
    groups: [infra]
  users:
    svc-a:
      service: true
    svc-b:
      uid: 1500
"#,
    );

    let document =
        load_inventory(&temp_dir.path().join("users.yaml")).expect("inventory should load");

    assert_eq!(document.sections.len(), 2);
    assert_eq!(document.user_count(), 2, "the example section must not count");

    let infra = document.get("infra").expect("infra section present");
    assert_eq!(infra.users.len(), 2);
    assert_eq!(infra.users["svc-b"]["uid"], serde_json::json!(1500));
    assert_eq!(infra.defaults["groups"], serde_json::json!(["infra"]));
}

#[test]
fn inventory_missing_file_is_an_error() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let error = load_inventory(&temp_dir.path().join("absent.yaml"))
        .expect_err("missing inventory should fail");
    assert!(error.to_string().contains("not found"));
}

#[test]
fn inventory_rejects_malformed_documents() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    write_file(
        temp_dir.path(),
        "users.yaml",
        r#"
infra:
  users: "not a mapping"
"#,
    );

    let error = load_inventory(&temp_dir.path().join("users.yaml"))
        .expect_err("malformed inventory should fail");
    assert!(error.to_string().contains("invalid user inventory"));
}
