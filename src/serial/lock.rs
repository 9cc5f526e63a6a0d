//! UUCP-style advisory lock files for serial devices.
//!
//! A lock for `/dev/ttyACM0` lives at `<lock_dir>/LCK..ttyACM0` and contains the
//! owner's PID as a ten-column right-aligned decimal followed by a newline, the same
//! layout rxtx-based tools (e.g. the Arduino IDE) write, so those tools and this host
//! respect each other's locks.
//!
//! The protocol is best effort. Only exclusive creation is atomic; the stale-lock
//! check and removal can race with another process doing the same.

use crate::error::{ConnectError, LockError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name prefix for lock files.
pub const LOCK_PREFIX: &str = "LCK..";

/// Answers whether a process with the given PID is still running.
pub trait ProcessProbe {
    /// `true` if the process exists.
    fn is_alive(&self, pid: i32) -> bool;
}

/// Probes liveness with the null signal (`kill(pid, 0)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: i32) -> bool {
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            // EPERM: the process exists but belongs to someone else
            Err(_) => true,
        }
    }
}

/// Path of the lock file guarding `device`.
pub fn lock_file_path(lock_dir: &Path, device: &Path) -> PathBuf {
    let basename = device
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    lock_dir.join(format!("{LOCK_PREFIX}{basename}"))
}

/// Encode a PID the way the lock file stores it.
pub fn encode_pid(pid: i32) -> String {
    format!("{:>10}\n", pid)
}

/// Read the PID from a lock file.
///
/// `Ok(None)` means no lock file exists; unparsable contents yield `Some(0)`, which
/// callers treat as stale.
fn read_owner(path: &Path) -> std::io::Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents.trim().parse::<i32>().unwrap_or(0))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A held advisory lock. Released explicitly with [`DeviceLock::release`], or on drop.
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
    pid: i32,
    released: bool,
}

impl DeviceLock {
    /// Lock `device` on behalf of the current process.
    pub fn acquire(device: &Path, lock_dir: &Path) -> Result<Self, ConnectError> {
        Self::acquire_with(
            device,
            lock_dir,
            nix::unistd::getpid().as_raw(),
            &SignalProbe,
        )
    }

    /// Lock `device` on behalf of `pid`, probing other owners with `probe`.
    pub fn acquire_with(
        device: &Path,
        lock_dir: &Path,
        pid: i32,
        probe: &dyn ProcessProbe,
    ) -> Result<Self, ConnectError> {
        if !device.exists() {
            return Err(ConnectError::NotFound(device.to_path_buf()));
        }

        let path = lock_file_path(lock_dir, device);
        let lock_failed = |source: std::io::Error| ConnectError::LockFailed {
            path: path.clone(),
            source,
        };

        Self::clear_stale(&path, probe).map_err(|e| match e {
            StaleCheck::Locked(owner) => ConnectError::DeviceLocked(owner),
            StaleCheck::Io(source) => lock_failed(source),
        })?;

        let mut file = match Self::create_exclusive(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Someone won the race; if their lock is already stale, retry once.
                Self::clear_stale(&path, probe).map_err(|e| match e {
                    StaleCheck::Locked(owner) => ConnectError::DeviceLocked(owner),
                    StaleCheck::Io(source) => lock_failed(source),
                })?;
                Self::create_exclusive(&path).map_err(lock_failed)?
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(ConnectError::PermissionDenied(path.clone()));
            }
            Err(e) => return Err(lock_failed(e)),
        };

        if let Err(e) = file.write_all(encode_pid(pid).as_bytes()) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(lock = %path.display(), "Cannot remove lock file: {}", remove_err);
            }
            return Err(lock_failed(e));
        }

        debug!(lock = %path.display(), pid, "Device locked");
        Ok(Self {
            path,
            pid,
            released: false,
        })
    }

    /// Remove the lock file at `path` if its owner is gone.
    fn clear_stale(path: &Path, probe: &dyn ProcessProbe) -> Result<(), StaleCheck> {
        match read_owner(path).map_err(StaleCheck::Io)? {
            None => Ok(()),
            Some(owner) if owner > 0 && probe.is_alive(owner) => Err(StaleCheck::Locked(owner)),
            Some(owner) => {
                info!(lock = %path.display(), owner, "Removing stale lock file");
                match fs::remove_file(path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(StaleCheck::Io(e)),
                }
            }
        }
    }

    fn create_exclusive(path: &Path) -> std::io::Result<fs::File> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o444);
        }
        options.open(path)
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID written into the lock file.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Release the lock, removing the file only if it still names our PID.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        Self::unlock(&self.path, self.pid)
    }

    fn unlock(path: &Path, pid: i32) -> Result<(), LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        match read_owner(path).map_err(io_err)? {
            None => Err(LockError::Missing),
            Some(owner) if owner <= 0 || owner == pid => {
                fs::remove_file(path).map_err(io_err)?;
                debug!(lock = %path.display(), "Device unlocked");
                Ok(())
            }
            Some(owner) => Err(LockError::ForeignOwner(owner)),
        }
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = Self::unlock(&self.path, self.pid) {
                warn!(lock = %self.path.display(), "{}", e);
            }
        }
    }
}

enum StaleCheck {
    Locked(i32),
    Io(std::io::Error),
}
