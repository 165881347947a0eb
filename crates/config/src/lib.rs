//! Configuration loading for userforge.
//!
//! Two inputs are loaded here: the application settings (defaults, then an
//! optional settings file, then `USERFORGE__`-prefixed environment
//! overrides) and the user inventory, the sections document driving a batch
//! run.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use userforge_identity::{ConflictPolicy, MissingGroupPolicy, SectionsDocument};
use userforge_password::PasswordComplexity;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "userforge.toml",
    "config/userforge.toml",
    "/etc/userforge/userforge.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub inventory: InventoryConfig,
    pub provision: ProvisionConfig,
    pub password: PasswordComplexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Default inventory file consulted when no path is given explicitly.
    pub path: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: "users.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub missing_group_policy: MissingGroupPolicy,
    #[serde(default = "ProvisionConfig::default_known_hosts_source")]
    pub known_hosts_source: String,
}

impl ProvisionConfig {
    fn default_known_hosts_source() -> String {
        "./known_hosts".to_string()
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            missing_group_policy: MissingGroupPolicy::default(),
            known_hosts_source: Self::default_known_hosts_source(),
        }
    }
}

/// Load the application settings by combining defaults, an optional file
/// and environment overrides.
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("inventory.path", defaults.inventory.path.clone())
        .unwrap()
        .set_default("provision.conflict_policy", "fail")
        .unwrap()
        .set_default("provision.missing_group_policy", "create")
        .unwrap()
        .set_default(
            "provision.known_hosts_source",
            defaults.provision.known_hosts_source.clone(),
        )
        .unwrap()
        .set_default("password.min_length", defaults.password.min_length as i64)
        .unwrap()
        .set_default("password.max_length", defaults.password.max_length as i64)
        .unwrap()
        .set_default("password.lower", defaults.password.lower)
        .unwrap()
        .set_default("password.caps", defaults.password.caps)
        .unwrap()
        .set_default("password.digits", defaults.password.digits)
        .unwrap()
        .set_default("password.special", defaults.password.special)
        .unwrap()
        .set_default("password.minimum_entropy", defaults.password.minimum_entropy)
        .unwrap();

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("USERFORGE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via USERFORGE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(config::Environment::with_prefix("USERFORGE").separator("__"));

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load a user inventory (the sections document) from a YAML or TOML file.
pub fn load_inventory(path: &Path) -> anyhow::Result<SectionsDocument> {
    if !path.exists() {
        anyhow::bail!("user inventory not found: {}", path.display());
    }

    let document = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .build()
        .with_context(|| format!("unable to read user inventory {}", path.display()))?
        .try_deserialize::<SectionsDocument>()
        .with_context(|| format!("invalid user inventory {}", path.display()))?;

    debug!(
        path = %path.display(),
        sections = document.sections.len(),
        users = document.user_count(),
        "loaded user inventory"
    );
    Ok(document)
}
