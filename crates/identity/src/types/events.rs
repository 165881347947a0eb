//! Structured provisioning events for observability sinks.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Per-user and per-batch provisioning events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProvisionEvent {
    /// A batch run began.
    BatchStarted {
        batch_id: String,
        sections: usize,
        users: usize,
        timestamp: DateTime<Utc>,
    },

    /// A section's users are about to be processed.
    SectionStarted {
        batch_id: String,
        section: String,
        users: usize,
        timestamp: DateTime<Utc>,
    },

    /// One user was fully provisioned.
    UserProvisioned {
        batch_id: String,
        name: String,
        uid: u32,
        gid: u32,
        timestamp: DateTime<Utc>,
    },

    /// One user failed; the batch moves on to the next.
    UserFailed {
        batch_id: String,
        name: String,
        phase: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// One previously provisioned user was removed.
    UserRetired {
        batch_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// The batch ran to completion.
    BatchCompleted {
        batch_id: String,
        passed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The batch stopped early on an unrecoverable collaborator failure.
    BatchAborted {
        batch_id: String,
        completed: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProvisionEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProvisionEvent::BatchStarted { timestamp, .. }
            | ProvisionEvent::SectionStarted { timestamp, .. }
            | ProvisionEvent::UserProvisioned { timestamp, .. }
            | ProvisionEvent::UserFailed { timestamp, .. }
            | ProvisionEvent::UserRetired { timestamp, .. }
            | ProvisionEvent::BatchCompleted { timestamp, .. }
            | ProvisionEvent::BatchAborted { timestamp, .. } => *timestamp,
        }
    }

    pub fn batch_id(&self) -> &str {
        match self {
            ProvisionEvent::BatchStarted { batch_id, .. }
            | ProvisionEvent::SectionStarted { batch_id, .. }
            | ProvisionEvent::UserProvisioned { batch_id, .. }
            | ProvisionEvent::UserFailed { batch_id, .. }
            | ProvisionEvent::UserRetired { batch_id, .. }
            | ProvisionEvent::BatchCompleted { batch_id, .. }
            | ProvisionEvent::BatchAborted { batch_id, .. } => batch_id,
        }
    }
}

/// Sink consuming structured provisioning events. The core emits; sinks
/// decide how (and whether) to surface them.
pub trait EventSink {
    fn emit(&self, event: &ProvisionEvent);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, event: &ProvisionEvent) {
        (**self).emit(event)
    }
}

/// Default sink forwarding events to the tracing backbone.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ProvisionEvent) {
        match event {
            ProvisionEvent::BatchStarted {
                batch_id,
                sections,
                users,
                ..
            } => info!(%batch_id, sections, users, "batch started"),
            ProvisionEvent::SectionStarted { section, users, .. } => {
                debug!(%section, users, "section started")
            }
            ProvisionEvent::UserProvisioned { name, uid, gid, .. } => {
                info!(%name, uid, gid, "user provisioned")
            }
            ProvisionEvent::UserFailed {
                name, phase, error, ..
            } => warn!(%name, %phase, %error, "user failed"),
            ProvisionEvent::UserRetired { name, .. } => info!(%name, "user retired"),
            ProvisionEvent::BatchCompleted { passed, failed, .. } => {
                info!(passed, failed, "batch completed")
            }
            ProvisionEvent::BatchAborted {
                completed, error, ..
            } => error!(completed, %error, "batch aborted"),
        }
    }
}

/// Sink that records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<ProvisionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ProvisionEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
