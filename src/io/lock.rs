//! Lock file management for single-instance enforcement.
//!
//! Two daemons would fight over the active mode, so only one may run per user. The
//! lock is an exclusive `flock` on `$XDG_RUNTIME_DIR/dusklight.lock` and the file holds
//! the owner's PID for diagnostics and stale lock cleanup.

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::constants::{FALLBACK_RUNTIME_DIR, LOCK_FILE_NAME};
use crate::common::logger::Log;
use crate::common::utils;

/// Held for the lifetime of the daemon. Dropping it releases the lock and removes the file.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Lock file path in the runtime directory.
pub fn default_lock_path() -> PathBuf {
    let runtime_dir =
        std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| FALLBACK_RUNTIME_DIR.to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// Acquire an exclusive lock on `lock_path`.
///
/// A lock left behind by a process that no longer exists is removed and acquisition
/// is retried once. If a live process holds the lock, or the holder has not written its
/// PID yet, an "already running" error is returned.
pub fn acquire_lock(lock_path: &Path, log: &Log) -> Result<InstanceLock> {
    if let Some(lock) = try_acquire(lock_path)? {
        return Ok(lock);
    }

    match read_owner_pid(lock_path) {
        Some(pid) if utils::is_process_running(pid) => {
            bail!("dusklight is already running (PID: {pid})");
        }
        Some(pid) => {
            log_warning!(log, "Removing stale lock file (process {pid} no longer running)");
        }
        None => {
            bail!("dusklight is already running (lock held, owner PID not recorded yet)");
        }
    }
    let _ = std::fs::remove_file(lock_path);

    try_acquire(lock_path)?.with_context(|| {
        format!(
            "failed to acquire {} after removing a stale lock",
            lock_path.display()
        )
    })
}

fn try_acquire(lock_path: &Path) -> Result<Option<InstanceLock>> {
    // Open without truncating so a competing owner's PID survives a failed attempt
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        file,
        path: lock_path.to_path_buf(),
    }))
}

fn read_owner_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}
