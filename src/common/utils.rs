//! Small helpers shared across modules.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};

/// Check whether a process with the given PID is still alive.
///
/// Sends signal 0, which performs the permission and existence checks without
/// delivering anything. `EPERM` means the process exists but belongs to someone else.
pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Replace the home directory prefix with `~` for display.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        return PathBuf::from("~").join(rest).display().to_string();
    }
    path.display().to_string()
}
