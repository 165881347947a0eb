//! Batch provisioning orchestration.
//!
//! Drives each user through a fixed sequence of states, collecting one
//! outcome per attempted user. The first error in any state fails that user
//! and only that user; the batch moves on. The single exception is an
//! unrecoverable collaborator failure, which aborts the remaining batch
//! while keeping the outcomes built so far.
//!
//! Processing is strictly sequential: identifier allocation reads and
//! updates the batch-scoped reservation set, and a fixed order is what makes
//! auto-assigned identifiers reproducible across runs.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use userforge_identity::entities::identity::ARTIFACT_SOURCE;
use userforge_identity::services::{allocator, config_resolver, group_resolver::GroupResolution};
use userforge_identity::utils::validation;
use userforge_identity::{
    AttrMap, ConflictPolicy, EntityKind, EventSink, IdKind, IdentityAssignment, IdentityMutator,
    IdentityStore, MissingGroupPolicy, PasswordPolicy, ProvisionError, ProvisionEvent,
    ProvisionResult, ReservationSet, ResolvedIdentity, ResolvedSpec, SectionsDocument,
    SERVICE_SHELL,
};

/// Per-user provisioning states, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    Pending,
    ConfigResolved,
    IdentityAllocated,
    GroupsResolved,
    MutationDelegated,
}

impl ProvisionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionPhase::Pending => "pending",
            ProvisionPhase::ConfigResolved => "config_resolved",
            ProvisionPhase::IdentityAllocated => "identity_allocated",
            ProvisionPhase::GroupsResolved => "groups_resolved",
            ProvisionPhase::MutationDelegated => "mutation_delegated",
        }
    }
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of one attempted user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Pass,
    Fail,
}

/// One entry of the batch report, immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningOutcome {
    pub name: String,
    pub status: OutcomeStatus,
    pub artifact: Option<ResolvedIdentity>,
    pub error: Option<String>,
}

impl ProvisioningOutcome {
    fn pass(name: &str, artifact: Option<ResolvedIdentity>) -> Self {
        Self {
            name: name.to_string(),
            status: OutcomeStatus::Pass,
            artifact,
            error: None,
        }
    }

    fn fail(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            status: OutcomeStatus::Fail,
            artifact: None,
            error: Some(error),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == OutcomeStatus::Pass
    }
}

/// Report for one completed batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ProvisioningOutcome>,
}

impl BatchReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }
}

/// An unrecoverable collaborator failure stopped the batch early. The
/// outcomes accumulated before the abort point stay accessible.
#[derive(Debug, Error)]
#[error("batch aborted: {source}")]
pub struct BatchAborted {
    pub batch_id: Uuid,
    pub outcomes: Vec<ProvisioningOutcome>,
    #[source]
    pub source: ProvisionError,
}

/// Policies and paths steering a batch run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub conflict_policy: ConflictPolicy,
    pub missing_group_policy: MissingGroupPolicy,
    /// Source file copied into `<home>/.ssh/known_hosts` on request.
    pub known_hosts_source: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            missing_group_policy: MissingGroupPolicy::default(),
            known_hosts_source: "./known_hosts".to_string(),
        }
    }
}

struct UserFailure {
    phase: ProvisionPhase,
    error: ProvisionError,
}

impl UserFailure {
    fn at(phase: ProvisionPhase, error: ProvisionError) -> Self {
        Self { phase, error }
    }
}

/// Sequences resolution and delegated mutation across a batch of sections.
pub struct Orchestrator<S, M, P, E> {
    store: S,
    mutator: M,
    password_policy: P,
    sink: E,
    options: OrchestratorOptions,
}

impl<S, M, P, E> Orchestrator<S, M, P, E>
where
    S: IdentityStore,
    M: IdentityMutator,
    P: PasswordPolicy,
    E: EventSink,
{
    pub fn new(store: S, mutator: M, password_policy: P, sink: E) -> Self {
        Self::with_options(store, mutator, password_policy, sink, OrchestratorOptions::default())
    }

    pub fn with_options(
        store: S,
        mutator: M,
        password_policy: P,
        sink: E,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            store,
            mutator,
            password_policy,
            sink,
            options,
        }
    }

    /// Provision every user of every provisionable section, one outcome per
    /// attempted user. The reservation set lives exactly as long as this
    /// call; nothing carries over between runs.
    pub fn provision_batch(
        &mut self,
        document: &SectionsDocument,
    ) -> Result<BatchReport, BatchAborted> {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut reservations = ReservationSet::new();
        let mut outcomes = Vec::new();

        self.sink.emit(&ProvisionEvent::BatchStarted {
            batch_id: batch_id.to_string(),
            sections: document.provisionable().count(),
            users: document.user_count(),
            timestamp: Utc::now(),
        });

        for (section_name, section) in document.provisionable() {
            info!(section = %section_name, users = section.users.len(), "provisioning section");
            self.sink.emit(&ProvisionEvent::SectionStarted {
                batch_id: batch_id.to_string(),
                section: section_name.to_string(),
                users: section.users.len(),
                timestamp: Utc::now(),
            });

            for (user_name, user_config) in &section.users {
                match self.provision_user(user_name, user_config, &section.defaults, &mut reservations)
                {
                    Ok(artifact) => {
                        self.sink.emit(&ProvisionEvent::UserProvisioned {
                            batch_id: batch_id.to_string(),
                            name: user_name.clone(),
                            uid: artifact.uid,
                            gid: artifact.gid,
                            timestamp: Utc::now(),
                        });
                        outcomes.push(ProvisioningOutcome::pass(user_name, Some(artifact)));
                    }
                    Err(failure) => {
                        if let ProvisionError::Unrecoverable(_) = failure.error {
                            self.sink.emit(&ProvisionEvent::BatchAborted {
                                batch_id: batch_id.to_string(),
                                completed: outcomes.len(),
                                error: failure.error.to_string(),
                                timestamp: Utc::now(),
                            });
                            return Err(BatchAborted {
                                batch_id,
                                outcomes,
                                source: failure.error,
                            });
                        }

                        self.sink.emit(&ProvisionEvent::UserFailed {
                            batch_id: batch_id.to_string(),
                            name: user_name.clone(),
                            phase: failure.phase.as_str().to_string(),
                            error: failure.error.to_string(),
                            timestamp: Utc::now(),
                        });
                        outcomes.push(ProvisioningOutcome::fail(user_name, failure.error.to_string()));
                    }
                }
            }
        }

        let report = BatchReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        self.sink.emit(&ProvisionEvent::BatchCompleted {
            batch_id: batch_id.to_string(),
            passed: report.passed(),
            failed: report.failed(),
            timestamp: Utc::now(),
        });
        Ok(report)
    }

    /// Remove previously provisioned identities, one outcome per name.
    /// Names unknown to the store pass as no-ops.
    pub fn retire(&mut self, names: &[String]) -> Result<BatchReport, BatchAborted> {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut outcomes = Vec::new();

        for name in names {
            match self.retire_user(name) {
                Ok(removed) => {
                    if removed {
                        self.sink.emit(&ProvisionEvent::UserRetired {
                            batch_id: batch_id.to_string(),
                            name: name.clone(),
                            timestamp: Utc::now(),
                        });
                    } else {
                        info!(%name, "user does not exist, nothing to retire");
                    }
                    outcomes.push(ProvisioningOutcome::pass(name, None));
                }
                Err(error @ ProvisionError::Unrecoverable(_)) => {
                    self.sink.emit(&ProvisionEvent::BatchAborted {
                        batch_id: batch_id.to_string(),
                        completed: outcomes.len(),
                        error: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(BatchAborted {
                        batch_id,
                        outcomes,
                        source: error,
                    });
                }
                Err(error) => {
                    warn!(%name, %error, "failed to retire user");
                    outcomes.push(ProvisioningOutcome::fail(name, error.to_string()));
                }
            }
        }

        Ok(BatchReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        })
    }

    fn retire_user(&mut self, name: &str) -> ProvisionResult<bool> {
        if !self.store.exists(name, EntityKind::User)? {
            return Ok(false);
        }
        self.mutator.remove_identity(name)?;
        Ok(true)
    }

    fn provision_user(
        &mut self,
        name: &str,
        user_config: &AttrMap,
        section_defaults: &AttrMap,
        reservations: &mut ReservationSet,
    ) -> Result<ResolvedIdentity, UserFailure> {
        let mut phase = ProvisionPhase::Pending;

        // The user's name is the key of the section's user mapping.
        let mut user_layer = user_config.clone();
        user_layer.insert("name".to_string(), Value::String(name.to_string()));

        let spec = config_resolver::resolve(&user_layer, section_defaults)
            .and_then(|spec| {
                validation::validate_username(&spec.name)?;
                Ok(spec)
            })
            .map_err(|error| UserFailure::at(phase, error))?;
        phase = ProvisionPhase::ConfigResolved;
        debug!(%name, %phase, "state advanced");

        let uid = self
            .allocate_with_policy(IdKind::Uid, &spec, reservations)
            .map_err(|error| UserFailure::at(phase, error))?;
        let gid = self
            .allocate_with_policy(IdKind::Gid, &spec, reservations)
            .map_err(|error| UserFailure::at(phase, error))?;
        phase = ProvisionPhase::IdentityAllocated;
        debug!(%name, %phase, uid = uid.resolved_value, gid = gid.resolved_value, "state advanced");

        let groups = GroupResolution::from_spec(&spec);
        for group in &groups.resolved {
            validation::validate_group_name(group).map_err(|error| UserFailure::at(phase, error))?;
        }
        phase = ProvisionPhase::GroupsResolved;
        debug!(%name, %phase, groups = groups.resolved.len(), "state advanced");

        let artifact = self
            .apply(&spec, &uid, &gid, &groups)
            .map_err(|error| UserFailure::at(phase, error))?;
        phase = ProvisionPhase::MutationDelegated;
        debug!(%name, %phase, "state advanced");

        Ok(artifact)
    }

    /// Allocate one identifier, letting the conflict policy turn a refusal
    /// into an auto-assignment instead of a failure.
    fn allocate_with_policy(
        &self,
        kind: IdKind,
        spec: &ResolvedSpec,
        reservations: &mut ReservationSet,
    ) -> ProvisionResult<IdentityAssignment> {
        let (requested, allow_autoassign) = match kind {
            IdKind::Uid => (spec.uid, spec.uid_next_available),
            IdKind::Gid => (spec.gid, spec.gid_next_available),
        };

        match allocator::allocate(
            &self.store,
            kind,
            &spec.name,
            requested,
            allow_autoassign,
            reservations,
        ) {
            Err(ProvisionError::IdentifierConflict { requested, .. })
                if self.options.conflict_policy == ConflictPolicy::AutoAssign =>
            {
                warn!(name = %spec.name, %kind, requested, "identifier conflict auto-resolved by policy");
                allocator::allocate(&self.store, kind, &spec.name, requested, true, reservations)
            }
            other => other,
        }
    }

    /// Delegate the mutation sequence for one resolved user: primary group,
    /// identity, full name, password, memberships, SSH material. One call
    /// per attribute category, no retries.
    fn apply(
        &mut self,
        spec: &ResolvedSpec,
        uid: &IdentityAssignment,
        gid: &IdentityAssignment,
        groups: &GroupResolution,
    ) -> ProvisionResult<ResolvedIdentity> {
        let name = &spec.name;
        let shell = spec.effective_shell();
        if spec.is_service_account() && spec.shell != SERVICE_SHELL {
            warn!(%name, requested = %spec.shell, "service account shell overridden to nologin");
        }
        let home = spec.effective_home();

        // Primary group first so the identity can reference its gid.
        self.mutator.create_group(name, Some(gid.resolved_value))?;
        self.mutator.create_or_modify_identity(
            name,
            uid.resolved_value,
            gid.resolved_value,
            shell,
            home.as_deref(),
        )?;

        if let Some(full_name) = &spec.full_name {
            self.mutator.set_full_name(name, full_name)?;
        }

        let password_entropy = if spec.is_service_account() {
            debug!(%name, "service account, skipping password");
            None
        } else {
            Some(self.apply_password(spec)?)
        };

        let mut applied_groups = BTreeSet::new();
        for group in &groups.resolved {
            if !self.store.exists(group, EntityKind::Group)? {
                match self.options.missing_group_policy {
                    MissingGroupPolicy::Create => {
                        info!(%group, "creating missing group");
                        self.mutator.create_group(group, None)?;
                    }
                    MissingGroupPolicy::Skip => {
                        info!(%name, %group, "skipping membership in missing group");
                        continue;
                    }
                    MissingGroupPolicy::Fail => {
                        return Err(ProvisionError::InvalidConfig(format!(
                            "group '{group}' does not exist"
                        )));
                    }
                }
            }
            self.mutator.add_to_group(name, group)?;
            applied_groups.insert(group.clone());
        }

        let ssh_key = !spec.is_service_account() && spec.ssh_key;
        if ssh_key {
            let home = home.as_deref().ok_or_else(|| {
                ProvisionError::InvalidConfig(
                    "ssh key generation requires a home directory".to_string(),
                )
            })?;
            self.mutator.generate_ssh_key(name, home)?;
        } else if spec.ssh_key {
            debug!(%name, "service account, skipping ssh key generation");
        }

        let known_hosts = !spec.is_service_account() && spec.known_hosts;
        if known_hosts {
            let home = home.as_deref().ok_or_else(|| {
                ProvisionError::InvalidConfig(
                    "known_hosts installation requires a home directory".to_string(),
                )
            })?;
            self.mutator
                .install_known_hosts(name, home, &self.options.known_hosts_source)?;
        }

        Ok(ResolvedIdentity {
            username: name.clone(),
            uid: uid.resolved_value,
            gid: gid.resolved_value,
            shell: shell.to_string(),
            home,
            groups: applied_groups,
            service: spec.service,
            ssh_key,
            known_hosts,
            password_entropy,
            source: ARTIFACT_SOURCE.to_string(),
        })
    }

    fn apply_password(&mut self, spec: &ResolvedSpec) -> ProvisionResult<f64> {
        if spec.generate_password {
            let password = self.password_policy.generate()?;
            self.mutator.set_password(&spec.name, &password)?;
            info!(name = %spec.name, "generated password applied");
            Ok(self.password_policy.estimate_entropy(&password))
        } else if let Some(password) = &spec.password {
            if !self.password_policy.validate(password) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "configured password for '{}' rejected by the password policy",
                    spec.name
                )));
            }
            self.mutator.set_password(&spec.name, password)?;
            Ok(self.password_policy.estimate_entropy(password))
        } else {
            Err(ProvisionError::InvalidConfig(format!(
                "user '{}' needs a password or generate_password enabled",
                spec.name
            )))
        }
    }
}
