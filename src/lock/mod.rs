//! Named, cross-process exclusive locks backed by `flock(2)`.
//!
//! A lock name maps to `<dir>/<name>.lock`. The file is created on first use
//! and never removed; holding the lock means holding an exclusive `flock` on
//! an open descriptor of that file, so the lock vanishes with the process.

use std::{
    cell::RefCell,
    fs::{self, File, OpenOptions},
    io,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, warn};

use crate::{Error, Result};

pub const LOCK_EXTENSION: &str = "lock";
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct ExclusiveLock {
    path: PathBuf,
    file: RefCell<Option<File>>,
}

impl ExclusiveLock {
    /// Lock named `name` under the system temp directory.
    pub fn named(name: &str) -> Result<Self> {
        Self::named_in(std::env::temp_dir(), name)
    }

    pub fn named_in<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        validate_name(name).map_err(Error::InvalidLockName)?;
        Ok(Self {
            path: lock_path(dir.as_ref(), name),
            file: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.file.borrow().is_some()
    }

    /// Poll for the lock every [`POLL_INTERVAL`] until it is obtained or
    /// `timeout` has elapsed. The returned guard releases it on drop.
    pub fn acquire(&self, timeout: Duration) -> Result<LockGuard<'_>> {
        if self.is_locked() {
            return Err(Error::AlreadyLocked(self.path.display().to_string()).into());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create lock dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("failed to open lock file {}", self.path.display()))?;

        let started = Instant::now();
        loop {
            if try_flock(&file, libc::LOCK_EX | libc::LOCK_NB)? {
                debug!(
                    lock = %self.path.display(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "lock acquired"
                );
                *self.file.borrow_mut() = Some(file);
                return Ok(LockGuard { lock: self });
            }
            if started.elapsed() >= timeout {
                return Err(Error::LockTimeout {
                    path: self.path.display().to_string(),
                    timeout_ms: timeout.as_millis(),
                }
                .into());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Unlock and close the descriptor.
    pub fn release(&self) -> Result<()> {
        let file = self
            .file
            .borrow_mut()
            .take()
            .ok_or_else(|| Error::NotLocked(self.path.display().to_string()))?;
        // Closing `file` drops the flock even if the explicit unlock fails.
        try_flock(&file, libc::LOCK_UN)
            .with_context(|| format!("failed to unlock {}", self.path.display()))?;
        debug!(lock = %self.path.display(), "lock released");
        Ok(())
    }
}

/// Proof of a held [`ExclusiveLock`]; releases it on every exit path.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard<'a> {
    lock: &'a ExclusiveLock,
}

impl LockGuard<'_> {
    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    /// Release now, surfacing any unlock error instead of logging it.
    pub fn release(self) -> Result<()> {
        let lock = self.lock;
        std::mem::forget(self);
        lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Already released explicitly through the handle.
        if !self.lock.is_locked() {
            return;
        }
        if let Err(err) = self.lock.release() {
            warn!(lock = %self.lock.path().display(), error = %err, "failed to release lock");
        }
    }
}

pub fn lock_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{LOCK_EXTENSION}"))
}

/// A lock name must be a single plain path component.
pub fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(format!("{name:?}"));
    }
    Ok(())
}

/// Returns `Ok(false)` when a non-blocking request would block.
fn try_flock(file: &File, operation: libc::c_int) -> io::Result<bool> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}
