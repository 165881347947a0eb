//! Live adapter over the platform user database.
//!
//! Queries read `/etc/passwd` and `/etc/group` directly on every call so the
//! view always reflects current system state. Mutations shell out to the
//! standard tooling (`useradd`, `usermod`, `groupadd`, `chpasswd`,
//! `ssh-keygen`, `userdel`) behind `sudo`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::entities::identity::{EntityKind, IdKind};
use crate::store::{IdentityMutator, IdentityStore};
use crate::types::errors::{StoreError, StoreResult};

const PASSWD_PATH: &str = "/etc/passwd";
const GROUP_PATH: &str = "/etc/group";

/// Read-only view over the passwd and group databases.
#[derive(Debug, Clone)]
pub struct SystemStore {
    passwd_path: PathBuf,
    group_path: PathBuf,
}

impl Default for SystemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStore {
    pub fn new() -> Self {
        Self {
            passwd_path: PathBuf::from(PASSWD_PATH),
            group_path: PathBuf::from(GROUP_PATH),
        }
    }

    /// Point the store at alternate database files.
    pub fn with_paths(passwd_path: impl Into<PathBuf>, group_path: impl Into<PathBuf>) -> Self {
        Self {
            passwd_path: passwd_path.into(),
            group_path: group_path.into(),
        }
    }

    fn database(&self, kind: EntityKind) -> &Path {
        match kind {
            EntityKind::User => &self.passwd_path,
            EntityKind::Group => &self.group_path,
        }
    }

    /// Scan a colon-separated database, yielding `(name, id)` per entry.
    fn scan<T>(
        &self,
        kind: EntityKind,
        mut visit: impl FnMut(&str, u32) -> Option<T>,
    ) -> StoreResult<Option<T>> {
        let path = self.database(kind);
        let contents = std::fs::read_to_string(path)
            .map_err(|err| StoreError::Query(format!("unable to read {}: {err}", path.display())))?;

        for line in contents.lines() {
            let mut parts = line.split(':');
            let name = parts.next().unwrap_or_default();
            let id = parts.nth(1).and_then(|field| field.parse::<u32>().ok());
            if let Some(id) = id {
                if let Some(found) = visit(name, id) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

impl IdentityStore for SystemStore {
    fn exists(&self, name: &str, kind: EntityKind) -> StoreResult<bool> {
        Ok(self
            .scan(kind, |entry, _| (entry == name).then_some(()))?
            .is_some())
    }

    fn identifier_bound_to(&self, name: &str, kind: IdKind) -> StoreResult<Option<u32>> {
        self.scan(kind.entity(), |entry, id| (entry == name).then_some(id))
    }

    fn identifier_in_use(&self, value: u32, kind: IdKind) -> StoreResult<bool> {
        Ok(self
            .scan(kind.entity(), |_, id| (id == value).then_some(()))?
            .is_some())
    }
}

/// Mutation side, shelling out behind `sudo`.
#[derive(Debug, Clone)]
pub struct SystemMutator {
    store: SystemStore,
}

impl Default for SystemMutator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMutator {
    pub fn new() -> Self {
        Self {
            store: SystemStore::new(),
        }
    }

    fn run(&self, args: &[&str]) -> StoreResult<()> {
        self.run_with_input(args, None)
    }

    fn run_with_input(&self, args: &[&str], input: Option<&str>) -> StoreResult<()> {
        debug!(command = ?args, "delegating privileged mutation");
        let mut command = Command::new("sudo");
        command.args(args);
        if input.is_some() {
            command.stdin(Stdio::piped());
        }
        command.stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            StoreError::PrivilegeLost(format!("unable to invoke sudo: {err}"))
        })?;

        if let (Some(text), Some(stdin)) = (input, child.stdin.take()) {
            use std::io::Write;
            let mut stdin = stdin;
            stdin
                .write_all(text.as_bytes())
                .map_err(|err| StoreError::Mutation(format!("failed to write stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| StoreError::Mutation(format!("command did not complete: {err}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(StoreError::Mutation(format!(
                "'{}' exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )))
        }
    }

    fn ensure_home(&self, name: &str, home: &str) -> StoreResult<()> {
        self.run(&["mkdir", "-p", home])?;
        self.run(&["chown", &format!("{name}:{name}"), home])?;
        self.run(&["chmod", "755", home])
    }
}

impl IdentityMutator for SystemMutator {
    fn create_or_modify_identity(
        &mut self,
        name: &str,
        uid: u32,
        gid: u32,
        shell: &str,
        home: Option<&str>,
    ) -> StoreResult<()> {
        let uid = uid.to_string();
        let gid = gid.to_string();
        let exists = self.store.exists(name, EntityKind::User)?;

        let mut args: Vec<&str> = vec![
            if exists { "usermod" } else { "useradd" },
            "-u",
            &uid,
            "-g",
            &gid,
            "-s",
            shell,
        ];
        if let Some(home) = home {
            args.push("-d");
            args.push(home);
        }
        args.push(name);
        self.run(&args)?;

        if let Some(home) = home {
            self.ensure_home(name, home)?;
        }
        info!(%name, %uid, %gid, %shell, "identity applied");
        Ok(())
    }

    fn create_group(&mut self, name: &str, gid: Option<u32>) -> StoreResult<()> {
        let exists = self.store.exists(name, EntityKind::Group)?;
        match (exists, gid) {
            (false, Some(gid)) => self.run(&["groupadd", "-g", &gid.to_string(), name]),
            (false, None) => self.run(&["groupadd", name]),
            (true, Some(gid)) => {
                if self.store.identifier_bound_to(name, IdKind::Gid)? == Some(gid) {
                    debug!(%name, gid, "group already carries the requested gid");
                    Ok(())
                } else {
                    self.run(&["groupmod", "-g", &gid.to_string(), name])
                }
            }
            (true, None) => Ok(()),
        }
    }

    fn add_to_group(&mut self, name: &str, group: &str) -> StoreResult<()> {
        self.run(&["usermod", "-aG", group, name])
    }

    fn set_password(&mut self, name: &str, password: &str) -> StoreResult<()> {
        self.run_with_input(&["chpasswd"], Some(&format!("{name}:{password}\n")))
    }

    fn set_full_name(&mut self, name: &str, full_name: &str) -> StoreResult<()> {
        self.run(&["usermod", "-c", full_name, name])
    }

    fn generate_ssh_key(&mut self, name: &str, home: &str) -> StoreResult<()> {
        let ssh_dir = format!("{home}/.ssh");
        let key_path = format!("{ssh_dir}/id_rsa");
        let owner = format!("{name}:{name}");

        self.run(&["mkdir", "-p", &ssh_dir])?;
        self.run(&["chown", &owner, &ssh_dir])?;
        self.run(&["chmod", "700", &ssh_dir])?;
        self.run(&[
            "ssh-keygen", "-t", "rsa", "-b", "4096", "-f", &key_path, "-N", "",
        ])?;
        self.run(&["chown", &owner, &key_path])?;
        self.run(&["chown", &owner, &format!("{key_path}.pub")])?;
        info!(%name, %key_path, "ssh key generated");
        Ok(())
    }

    fn install_known_hosts(&mut self, name: &str, home: &str, source: &str) -> StoreResult<()> {
        let ssh_dir = format!("{home}/.ssh");
        let destination = format!("{ssh_dir}/known_hosts");
        let owner = format!("{name}:{name}");

        self.run(&["mkdir", "-p", &ssh_dir])?;
        self.run(&["cp", source, &destination])?;
        self.run(&["chown", &owner, &destination])
    }

    fn remove_identity(&mut self, name: &str) -> StoreResult<()> {
        self.run(&["userdel", "--remove", name])?;
        info!(%name, "identity removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fake_databases() -> (NamedTempFile, NamedTempFile) {
        let mut passwd = NamedTempFile::new().unwrap();
        writeln!(passwd, "root:x:0:0:root:/root:/bin/bash").unwrap();
        writeln!(passwd, "alice:x:1000:1000:Alice:/home/alice:/bin/bash").unwrap();
        writeln!(passwd, "broken line without colons").unwrap();

        let mut group = NamedTempFile::new().unwrap();
        writeln!(group, "root:x:0:").unwrap();
        writeln!(group, "infra:x:1200:alice").unwrap();

        (passwd, group)
    }

    #[test]
    fn looks_up_users_and_groups_by_name() {
        let (passwd, group) = fake_databases();
        let store = SystemStore::with_paths(passwd.path(), group.path());

        assert!(store.exists("alice", EntityKind::User).unwrap());
        assert!(!store.exists("bob", EntityKind::User).unwrap());
        assert!(store.exists("infra", EntityKind::Group).unwrap());
        assert!(!store.exists("alice", EntityKind::Group).unwrap());
    }

    #[test]
    fn resolves_bound_identifiers() {
        let (passwd, group) = fake_databases();
        let store = SystemStore::with_paths(passwd.path(), group.path());

        assert_eq!(
            store.identifier_bound_to("alice", IdKind::Uid).unwrap(),
            Some(1000)
        );
        assert_eq!(
            store.identifier_bound_to("infra", IdKind::Gid).unwrap(),
            Some(1200)
        );
        assert_eq!(store.identifier_bound_to("bob", IdKind::Uid).unwrap(), None);
    }

    #[test]
    fn namespaces_are_probed_independently() {
        let (passwd, group) = fake_databases();
        let store = SystemStore::with_paths(passwd.path(), group.path());

        assert!(store.identifier_in_use(1000, IdKind::Uid).unwrap());
        assert!(!store.identifier_in_use(1000, IdKind::Gid).unwrap());
        assert!(store.identifier_in_use(1200, IdKind::Gid).unwrap());
        assert!(!store.identifier_in_use(4242, IdKind::Uid).unwrap());
    }

    #[test]
    fn unreadable_database_is_a_query_error() {
        let store = SystemStore::with_paths("/nonexistent/passwd", "/nonexistent/group");
        let err = store.exists("alice", EntityKind::User).unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }
}
