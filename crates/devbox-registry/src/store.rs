//! Persistent container registry.
//!
//! Maintains a local JSON document of all containers and their last known
//! states, safe to share between concurrent `devbox-ctl` processes.
//!
//! # Locking
//!
//! All locks are taken on `<registry>.lock`, never on the document itself:
//! every write replaces the document by renaming a new file over it, which
//! would silently detach a lock held on the old inode.
//!
//! - [`RegistryStore::read`] holds a shared lock while it loads.
//! - [`RegistryStore::mutate`] holds an exclusive lock across load, apply,
//!   and write, so concurrent mutations are serialized and none is lost.
//!
//! # Crash safety
//!
//! New contents are written to a temporary sibling, fsynced, and renamed
//! over the target. A process killed at any point leaves either the old or
//! the new document on disk, never a truncated one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devbox_common::config::DevboxConfig;
use devbox_common::constants::{LOCK_FILE_SUFFIX, SCHEMA_VERSION};
use devbox_common::error::{DevboxError, Result};
use devbox_common::types::{ContainerRecord, RecordUpdate, Registry};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::lock::{self, LockMode};

/// Mode applied to a freshly initialized registry document.
#[cfg(unix)]
const REGISTRY_FILE_MODE: u32 = 0o644;

/// Only the schema header, read before the full document is trusted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaProbe {
    schema_version: Option<u32>,
}

/// Handle to the registry document on disk.
///
/// Holds no registry contents: every call reads the file afresh.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl RegistryStore {
    /// Creates a handle for the registry at `path`.
    ///
    /// Nothing is touched on disk until the first operation.
    pub fn open(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(LOCK_FILE_SUFFIX);
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_timeout,
        }
    }

    /// Creates a handle from the process configuration.
    pub fn from_config(config: &DevboxConfig) -> Self {
        Self::open(config.registry_file.clone(), config.lock_timeout())
    }

    /// Path of the registry document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Creates the registry with no containers if it does not exist yet.
    ///
    /// Safe against concurrent first-time initialization: the empty
    /// document is published with an exclusive no-clobber link, so exactly
    /// one racer creates the file and the others observe it already
    /// present. An existing file is never modified.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Io`] if the directory or file cannot be
    /// created.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let parent = self.parent_dir()?;
        fs::create_dir_all(parent).map_err(|e| DevboxError::io(parent, e))?;

        let temp = self.stage(&Registry::empty())?;
        set_initial_mode(&temp)?;
        match temp.persist_noclobber(&self.path) {
            Ok(_published) => {
                sync_dir(parent)?;
                tracing::info!(path = %self.path.display(), "initialized empty registry");
                Ok(())
            }
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "registry initialized concurrently");
                Ok(())
            }
            Err(err) => Err(DevboxError::io(&self.path, err.error)),
        }
    }

    /// Loads the registry under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::Corruption`] if the document does not parse
    /// or carries an unknown schema version, [`DevboxError::LockTimeout`]
    /// if a writer holds the lock too long, or [`DevboxError::Io`].
    pub fn read(&self) -> Result<Registry> {
        self.ensure_initialized()?;
        let _lock = lock::acquire(&self.lock_path, LockMode::Shared, self.lock_timeout)?;
        self.load()
    }

    /// Applies `apply` to the registry as one atomic read-modify-write.
    ///
    /// The exclusive lock is held from load until the new document has
    /// replaced the old one. If `apply` returns an error nothing is written
    /// and the error is returned unchanged, so a closure can veto its own
    /// change (for example when a quota is exceeded at write time).
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or any error [`Self::read`] can return,
    /// or [`DevboxError::Io`] if the new document cannot be written.
    pub fn mutate<T>(&self, apply: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        self.ensure_initialized()?;
        let _lock = lock::acquire(&self.lock_path, LockMode::Exclusive, self.lock_timeout)?;
        let mut registry = self.load()?;
        let value = apply(&mut registry)?;
        self.write(&registry)?;
        Ok(value)
    }

    /// Appends a record, rejecting a name that is already registered.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::AlreadyExists`] or any [`Self::mutate`] error.
    pub fn insert(&self, record: ContainerRecord) -> Result<()> {
        self.mutate(|registry| {
            if registry.contains(record.name().as_str()) {
                return Err(DevboxError::AlreadyExists {
                    name: record.name().to_string(),
                });
            }
            tracing::debug!(name = %record.name(), owner = record.owner(), "inserting record");
            registry.push(record);
            Ok(())
        })
    }

    /// Applies `updates` to the named record and returns the result.
    ///
    /// # Errors
    ///
    /// Returns [`DevboxError::NotFound`], [`DevboxError::InvalidState`] for
    /// an illegal transition, or any [`Self::mutate`] error.
    pub fn update(&self, name: &str, updates: &[RecordUpdate]) -> Result<ContainerRecord> {
        self.mutate(|registry| {
            let record = registry
                .find_mut(name)
                .ok_or_else(|| DevboxError::NotFound {
                    name: name.to_string(),
                })?;
            record.apply(updates)?;
            tracing::debug!(name, state = %record.state(), "record updated");
            Ok(record.clone())
        })
    }

    /// Removes the named record, returning it if it was present.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::mutate`] error.
    pub fn remove(&self, name: &str) -> Result<Option<ContainerRecord>> {
        self.mutate(|registry| {
            let removed = registry.remove(name);
            tracing::debug!(name, removed = removed.is_some(), "record removed");
            Ok(removed)
        })
    }

    /// Looks up a record by name.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::read`] error.
    pub fn find_by_name(&self, name: &str) -> Result<Option<ContainerRecord>> {
        Ok(self.read()?.find(name).cloned())
    }

    /// Number of records owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::read`] error.
    pub fn count_by_owner(&self, owner: &str) -> Result<usize> {
        Ok(self.read()?.count_by_owner(owner))
    }

    /// Total number of records.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::read`] error.
    pub fn count_all(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Records owned by `owner`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::read`] error.
    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<ContainerRecord>> {
        Ok(self.read()?.by_owner(owner).cloned().collect())
    }

    /// Every record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns any [`Self::read`] error.
    pub fn list_all(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.read()?.into_records())
    }

    fn load(&self) -> Result<Registry> {
        let bytes = fs::read(&self.path).map_err(|e| DevboxError::io(&self.path, e))?;
        decode(&self.path, &bytes)
    }

    fn write(&self, registry: &Registry) -> Result<()> {
        let temp = self.stage(registry)?;
        if let Ok(meta) = fs::metadata(&self.path) {
            temp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| DevboxError::io(temp.path(), e))?;
        }
        let published = temp
            .persist(&self.path)
            .map_err(|e| DevboxError::io(&self.path, e.error))?;
        drop(published);
        sync_dir(self.parent_dir()?)?;
        tracing::debug!(
            path = %self.path.display(),
            containers = registry.len(),
            "registry written"
        );
        Ok(())
    }

    /// Writes `registry` to a synced temporary file next to the target.
    fn stage(&self, registry: &Registry) -> Result<NamedTempFile> {
        let parent = self.parent_dir()?;
        let payload = encode(registry)?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| DevboxError::io(parent, e))?;
        temp.write_all(&payload)
            .map_err(|e| DevboxError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| DevboxError::io(temp.path(), e))?;
        Ok(temp)
    }

    fn parent_dir(&self) -> Result<&Path> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent),
            Some(_) => Ok(Path::new(".")),
            None => Err(DevboxError::Config {
                message: format!("registry path has no parent: {}", self.path.display()),
            }),
        }
    }
}

/// Flushes a directory entry so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| DevboxError::io(dir, e))
}

/// Serializes a registry as indented JSON with a trailing newline.
///
/// # Errors
///
/// Returns [`DevboxError::Serialization`] if encoding fails.
pub fn encode(registry: &Registry) -> Result<Vec<u8>> {
    let mut payload = serde_json::to_vec_pretty(registry)?;
    payload.push(b'\n');
    Ok(payload)
}

/// Parses a registry document, rejecting unknown schema versions.
///
/// # Errors
///
/// Returns [`DevboxError::Corruption`] naming `path` on any failure.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<Registry> {
    let corrupt = |message: String| DevboxError::Corruption {
        path: path.to_path_buf(),
        message,
    };

    let probe: SchemaProbe =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("not a registry document: {e}")))?;
    match probe.schema_version {
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(corrupt(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
        None => return Err(corrupt("missing schemaVersion".to_string())),
    }

    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))
}

#[cfg(unix)]
fn set_initial_mode(temp: &NamedTempFile) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(REGISTRY_FILE_MODE))
        .map_err(|e| DevboxError::io(temp.path(), e))
}

#[cfg(not(unix))]
const fn set_initial_mode(_temp: &NamedTempFile) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use devbox_common::error::ErrorKind;
    use devbox_common::types::{
        ContainerName, ContainerSpec, ContainerState, CpuLimit, MemoryLimit, now,
    };

    use super::*;

    fn store_in(dir: &Path) -> RegistryStore {
        RegistryStore::open(dir.join("containers.json"), Duration::from_secs(2))
    }

    fn record(name: &str, owner: &str) -> ContainerRecord {
        let spec = ContainerSpec {
            name: ContainerName::parse(name).unwrap(),
            owner: owner.into(),
            cpu: CpuLimit::new(2).unwrap(),
            memory: MemoryLimit::parse("4G").unwrap(),
            with_sync_feature: false,
        };
        ContainerRecord::creating(&spec, now())
    }

    #[test]
    fn lock_path_is_a_sibling() {
        let store = RegistryStore::open("/srv/devbox/containers.json", Duration::from_secs(1));
        assert_eq!(store.lock_path(), Path::new("/srv/devbox/containers.json.lock"));
    }

    #[test]
    fn initialization_writes_an_empty_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RegistryStore::open(dir.path().join("nested/containers.json"), Duration::from_secs(1));
        store.ensure_initialized().expect("init");

        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("\"schemaVersion\": 1"));
        assert!(raw.contains("\"containers\": []"));
        assert!(store.read().expect("read").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn initialized_document_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.ensure_initialized().expect("init");
        store.insert(record("alpha", "alice")).expect("insert");
        let mode = fs::metadata(store.path()).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn initialization_never_touches_an_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        store.ensure_initialized().expect("re-init");
        assert_eq!(store.count_all().expect("count"), 1);
    }

    #[test]
    fn insert_rejects_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        let err = store.insert(record("alpha", "bob")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.count_all().expect("count"), 1);
    }

    #[test]
    fn update_applies_closed_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");

        let updated = store
            .update(
                "alpha",
                &[
                    RecordUpdate::Transition(ContainerState::Running),
                    RecordUpdate::AssignAddress(Some("100.64.0.2".into())),
                ],
            )
            .expect("update");
        assert_eq!(updated.state(), ContainerState::Running);

        let reloaded = store.find_by_name("alpha").expect("find").expect("present");
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn update_of_missing_record_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let err = store
            .update("ghost", &[RecordUpdate::Touch(now())])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn failing_closure_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        let before = fs::read(store.path()).expect("read");

        let result: Result<()> = store.mutate(|registry| {
            registry.push(record("bravo", "bob"));
            Err(DevboxError::Config {
                message: "veto".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(fs::read(store.path()).expect("read"), before);
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        assert!(store.remove("alpha").expect("remove").is_some());
        assert!(store.remove("alpha").expect("remove again").is_none());
    }

    #[test]
    fn owner_projections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        store.insert(record("bravo", "bob")).expect("insert");
        store.insert(record("charlie", "alice")).expect("insert");

        assert_eq!(store.count_by_owner("alice").expect("count"), 2);
        let names: Vec<_> = store
            .list_by_owner("alice")
            .expect("list")
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "charlie"]);
        assert_eq!(store.list_all().expect("all").len(), 3);
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), b"{ not json").expect("write");
        let err = store.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn empty_file_is_reported_as_corruption() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), b"").expect("write");
        let err = store.mutate(|_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(fs::read(store.path()).expect("read").is_empty());
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), br#"{"schemaVersion": 2, "containers": []}"#).expect("write");
        let err = store.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.to_string().contains("unsupported schema version 2"));
    }

    #[test]
    fn missing_schema_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(store.path(), br#"{"version": 1, "containers": []}"#).expect("write");
        let err = store.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn reads_time_out_while_a_writer_holds_the_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RegistryStore::open(dir.path().join("containers.json"), Duration::from_millis(50));
        store.ensure_initialized().expect("init");
        let _writer = lock::acquire(store.lock_path(), LockMode::Exclusive, Duration::from_secs(1))
            .expect("lock");

        let err = store.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        for name in ["alpha", "bravo", "charlie"] {
            store.insert(record(name, "alice")).expect("insert");
        }
        let mut entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["containers.json", "containers.json.lock"]);
    }

    #[test]
    fn directory_sync_reports_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(sync_dir(dir.path()).is_ok());
        let err = sync_dir(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn rewrites_sync_the_directory_and_stay_readable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        let updated = store
            .update("alpha", &[RecordUpdate::Touch(now())])
            .expect("update");
        assert_eq!(store.find_by_name("alpha").expect("find"), Some(updated));
    }

    #[cfg(unix)]
    #[test]
    fn reads_work_with_a_read_only_lock_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.insert(record("alpha", "alice")).expect("insert");
        fs::set_permissions(store.lock_path(), fs::Permissions::from_mode(0o444)).expect("chmod");

        assert_eq!(store.count_all().expect("count"), 1);
        assert_eq!(store.list_by_owner("alice").expect("list").len(), 1);
    }
}
