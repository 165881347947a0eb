//! In-memory identity store for tests and dry runs.
//!
//! Handles share state through `Rc`, so one instance can serve as both the
//! query side and the mutation side of a batch and observe its own writes.
//! Every mutation is recorded as `"category:name"` so callers can assert on
//! exactly which calls were delegated.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::entities::identity::{EntityKind, IdKind};
use crate::store::{IdentityMutator, IdentityStore};
use crate::types::errors::{StoreError, StoreResult};

#[derive(Debug, Default, Clone)]
struct MemoryUser {
    uid: u32,
    gid: u32,
    shell: String,
    home: Option<String>,
    full_name: Option<String>,
    password: Option<String>,
    groups: BTreeSet<String>,
    ssh_key: bool,
    known_hosts: bool,
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<String, MemoryUser>,
    groups: BTreeMap<String, u32>,
    calls: Vec<String>,
    failing_users: BTreeSet<String>,
    privilege_lost: bool,
}

impl Inner {
    fn record(&mut self, category: &str, name: &str) -> StoreResult<()> {
        if self.privilege_lost {
            return Err(StoreError::PrivilegeLost(
                "privileged mutation has been revoked".to_string(),
            ));
        }
        if self.failing_users.contains(name) {
            return Err(StoreError::Mutation(format!(
                "{category} rejected for '{name}'"
            )));
        }
        self.calls.push(format!("{category}:{name}"));
        Ok(())
    }

    fn next_free_gid(&self) -> u32 {
        let mut candidate = 1000;
        while self.groups.values().any(|gid| *gid == candidate) {
            candidate += 1;
        }
        candidate
    }
}

/// Shared-handle in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a user (uid namespace only).
    pub fn seed_user(&self, name: &str, uid: u32, gid: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.users.insert(
            name.to_string(),
            MemoryUser {
                uid,
                gid,
                shell: "/bin/bash".to_string(),
                ..MemoryUser::default()
            },
        );
    }

    /// Pre-populate a group (gid namespace only).
    pub fn seed_group(&self, name: &str, gid: u32) {
        self.inner.borrow_mut().groups.insert(name.to_string(), gid);
    }

    /// Every mutation delegated so far, as `"category:name"` entries.
    pub fn mutation_calls(&self) -> Vec<String> {
        self.inner.borrow().calls.clone()
    }

    /// Make every mutation touching this user fail.
    pub fn fail_mutations_for(&self, name: &str) {
        self.inner
            .borrow_mut()
            .failing_users
            .insert(name.to_string());
    }

    /// Simulate loss of the privilege required for any mutation.
    pub fn revoke_privilege(&self) {
        self.inner.borrow_mut().privilege_lost = true;
    }

    pub fn user_groups(&self, name: &str) -> BTreeSet<String> {
        self.inner
            .borrow()
            .users
            .get(name)
            .map(|user| user.groups.clone())
            .unwrap_or_default()
    }
}

impl IdentityStore for MemoryStore {
    fn exists(&self, name: &str, kind: EntityKind) -> StoreResult<bool> {
        let inner = self.inner.borrow();
        Ok(match kind {
            EntityKind::User => inner.users.contains_key(name),
            EntityKind::Group => inner.groups.contains_key(name),
        })
    }

    fn identifier_bound_to(&self, name: &str, kind: IdKind) -> StoreResult<Option<u32>> {
        let inner = self.inner.borrow();
        Ok(match kind {
            IdKind::Uid => inner.users.get(name).map(|user| user.uid),
            IdKind::Gid => inner.groups.get(name).copied(),
        })
    }

    fn identifier_in_use(&self, value: u32, kind: IdKind) -> StoreResult<bool> {
        let inner = self.inner.borrow();
        Ok(match kind {
            IdKind::Uid => inner.users.values().any(|user| user.uid == value),
            IdKind::Gid => inner.groups.values().any(|gid| *gid == value),
        })
    }
}

impl IdentityMutator for MemoryStore {
    fn create_or_modify_identity(
        &mut self,
        name: &str,
        uid: u32,
        gid: u32,
        shell: &str,
        home: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("create_or_modify_identity", name)?;
        let user = inner.users.entry(name.to_string()).or_default();
        user.uid = uid;
        user.gid = gid;
        user.shell = shell.to_string();
        user.home = home.map(str::to_string);
        Ok(())
    }

    fn create_group(&mut self, name: &str, gid: Option<u32>) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("create_group", name)?;
        let gid = gid.unwrap_or_else(|| inner.next_free_gid());
        inner.groups.insert(name.to_string(), gid);
        Ok(())
    }

    fn add_to_group(&mut self, name: &str, group: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("add_to_group", name)?;
        if !inner.groups.contains_key(group) {
            return Err(StoreError::Mutation(format!(
                "group '{group}' does not exist"
            )));
        }
        match inner.users.get_mut(name) {
            Some(user) => {
                user.groups.insert(group.to_string());
                Ok(())
            }
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }

    fn set_password(&mut self, name: &str, password: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("set_password", name)?;
        match inner.users.get_mut(name) {
            Some(user) => {
                user.password = Some(password.to_string());
                Ok(())
            }
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }

    fn set_full_name(&mut self, name: &str, full_name: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("set_full_name", name)?;
        match inner.users.get_mut(name) {
            Some(user) => {
                user.full_name = Some(full_name.to_string());
                Ok(())
            }
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }

    fn generate_ssh_key(&mut self, name: &str, _home: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("generate_ssh_key", name)?;
        match inner.users.get_mut(name) {
            Some(user) => {
                user.ssh_key = true;
                Ok(())
            }
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }

    fn install_known_hosts(&mut self, name: &str, _home: &str, _source: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("install_known_hosts", name)?;
        match inner.users.get_mut(name) {
            Some(user) => {
                user.known_hosts = true;
                Ok(())
            }
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }

    fn remove_identity(&mut self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.borrow_mut();
        inner.record("remove_identity", name)?;
        match inner.users.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::Mutation(format!("user '{name}' does not exist"))),
        }
    }
}
