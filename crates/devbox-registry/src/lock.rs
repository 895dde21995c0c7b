//! Advisory file locks with a bounded wait.
//!
//! Locks are `flock`-style and belong to the open file description, so two
//! handles opened separately contend even inside one process. A lock is
//! released when its [`RegistryLock`] is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use devbox_common::error::{DevboxError, Result};
use fs2::FileExt;

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Kind of lock to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once; excludes exclusive holders.
    Shared,
    /// Single holder; excludes everyone else.
    Exclusive,
}

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl RegistryLock {
    /// Mode the lock was acquired in.
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release registry lock");
        }
    }
}

/// Acquires a lock on `path`, creating the lock file if needed.
///
/// Polls with exponential backoff until `timeout` has elapsed.
///
/// # Errors
///
/// Returns [`DevboxError::LockTimeout`] if the lock is still contended at
/// the deadline, or [`DevboxError::Io`] if the lock file cannot be opened
/// or locked for another reason.
pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<RegistryLock> {
    let file = open_lock_file(path, mode).map_err(|e| DevboxError::io(path, e))?;

    let started = Instant::now();
    let deadline = started + timeout;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        match attempt {
            Ok(()) => {
                tracing::debug!(
                    path = %path.display(),
                    ?mode,
                    waited_ms = started.elapsed().as_millis(),
                    "registry lock acquired"
                );
                return Ok(RegistryLock {
                    file,
                    path: path.to_path_buf(),
                    mode,
                });
            }
            Err(err) if is_contended(&err) => {}
            Err(err) => return Err(DevboxError::io(path, err)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DevboxError::LockTimeout {
                path: path.to_path_buf(),
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        }
        std::thread::sleep(backoff.min(deadline - now));
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Shared holders only need to read an existing lock file, so a data
/// directory that is read-only to them still supports `list` and `status`.
fn open_lock_file(path: &Path, mode: LockMode) -> std::io::Result<File> {
    if mode == LockMode::Shared {
        match File::open(path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            opened => return opened,
        }
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
