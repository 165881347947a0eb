use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use userforge_config::{load as load_config, load_inventory};
use userforge_identity::store::memory::MemoryStore;
use userforge_identity::store::system::{SystemMutator, SystemStore};
use userforge_identity::{SectionsDocument, TracingSink};
use userforge_orchestrator::{BatchAborted, BatchReport, Orchestrator, OrchestratorOptions};
use userforge_password::PasswordEngine;

#[derive(Parser)]
#[command(
    name = "userforge",
    about = "Declarative user and group provisioning",
    version
)]
struct Cli {
    /// Inventory file to use instead of the configured one
    #[arg(short, long, global = true)]
    inventory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the inventory and apply it to the local system
    Provision {
        /// Provision only the named section
        #[arg(long)]
        section: Option<String>,
    },
    /// Resolve the inventory against an empty store, mutating nothing
    Plan {
        /// Plan only the named section
        #[arg(long)]
        section: Option<String>,
    },
    /// Remove previously provisioned identities
    Retire {
        /// Usernames to remove
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = load_config().context("failed to load configuration")?;

    let options = OrchestratorOptions {
        conflict_policy: config.provision.conflict_policy,
        missing_group_policy: config.provision.missing_group_policy,
        known_hosts_source: config.provision.known_hosts_source.clone(),
    };
    let engine = PasswordEngine::new(config.password.clone());

    let inventory_path = cli
        .inventory
        .unwrap_or_else(|| PathBuf::from(&config.inventory.path));

    match cli.command {
        Command::Provision { section } => {
            let document = load_document(&inventory_path, section.as_deref())?;
            info!(users = document.user_count(), "provisioning inventory");
            let mut orchestrator = Orchestrator::with_options(
                SystemStore::new(),
                SystemMutator::new(),
                engine,
                TracingSink,
                options,
            );
            finish(orchestrator.provision_batch(&document))
        }
        Command::Plan { section } => {
            let document = load_document(&inventory_path, section.as_deref())?;
            info!(users = document.user_count(), "planning inventory (dry run)");
            let store = MemoryStore::new();
            let mut orchestrator =
                Orchestrator::with_options(store.clone(), store, engine, TracingSink, options);
            finish(orchestrator.provision_batch(&document))
        }
        Command::Retire { names } => {
            let mut orchestrator = Orchestrator::with_options(
                SystemStore::new(),
                SystemMutator::new(),
                engine,
                TracingSink,
                options,
            );
            finish(orchestrator.retire(&names))
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")
}

fn load_document(path: &PathBuf, section: Option<&str>) -> anyhow::Result<SectionsDocument> {
    let document = load_inventory(path)?;
    restrict_to_section(document, section)
}

/// Narrow a document down to one named section, keeping its defaults layer.
fn restrict_to_section(
    document: SectionsDocument,
    section: Option<&str>,
) -> anyhow::Result<SectionsDocument> {
    let Some(name) = section else {
        return Ok(document);
    };

    let section_config = document
        .get(name)
        .cloned()
        .with_context(|| format!("section '{name}' not found in inventory"))?;

    let mut sections = BTreeMap::new();
    sections.insert(name.to_string(), section_config);
    Ok(SectionsDocument { sections })
}

/// Print the batch report as JSON and turn failures into exit status.
fn finish(result: Result<BatchReport, BatchAborted>) -> anyhow::Result<()> {
    match result {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render batch report")?
            );
            if report.failed() > 0 {
                anyhow::bail!(
                    "{} of {} user(s) failed",
                    report.failed(),
                    report.outcomes.len()
                );
            }
            Ok(())
        }
        Err(aborted) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&aborted.outcomes)
                    .context("failed to render partial outcomes")?
            );
            Err(anyhow::Error::new(aborted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_section_document() -> SectionsDocument {
        serde_json::from_value(json!({
            "infra": { "users": { "svc-a": { "service": true } } },
            "dev": { "users": { "alice": {} } }
        }))
        .unwrap()
    }

    #[test]
    fn restricting_to_a_section_keeps_only_that_section() {
        let document = restrict_to_section(two_section_document(), Some("infra")).unwrap();
        assert_eq!(document.sections.len(), 1);
        assert!(document.get("infra").is_some());
        assert!(document.get("dev").is_none());
    }

    #[test]
    fn restricting_to_an_unknown_section_fails() {
        let error = restrict_to_section(two_section_document(), Some("ops")).unwrap_err();
        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn no_section_filter_keeps_the_document() {
        let document = restrict_to_section(two_section_document(), None).unwrap();
        assert_eq!(document.sections.len(), 2);
    }
}
