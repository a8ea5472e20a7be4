//! Convention-based mode scripts.
//!
//! For a mode `m`, every regular file in `<dir>/<m>-mode.d/` is executed, for each
//! `<dir>` of the XDG data search path. The user's data directory comes first. When the
//! same file name appears in several directories, only the first one runs and the
//! others are reported as masked, so a user can override or disable a system script by
//! shipping one with the same name.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use super::ModeActivator;
use crate::common::constants::DEFAULT_DATA_DIRS;
use crate::common::logger::Log;
use crate::common::utils::private_path;
use crate::core::mode::Mode;

/// A script selected for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub path: PathBuf,
}

/// How a single script run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Success,
    Failed(i32),
    Signalled(i32),
    SpawnFailed(String),
}

/// Directories searched for mode scripts, highest priority first.
///
/// `$XDG_DATA_HOME` (default `~/.local/share`), then each entry of `$XDG_DATA_DIRS`
/// (default `/usr/local/share:/usr/share`).
pub fn script_search_path() -> Vec<PathBuf> {
    let mut search_path = Vec::new();

    if let Some(data_home) = dirs::data_dir() {
        search_path.push(data_home);
    }

    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|dirs| !dirs.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATA_DIRS.to_string());

    for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
        let dir = PathBuf::from(dir);
        if !search_path.contains(&dir) {
            search_path.push(dir);
        }
    }

    search_path
}

/// Collect the scripts for `mode`, applying name masking across `search_path`.
pub fn collect_scripts(search_path: &[PathBuf], mode: Mode, log: &Log) -> Vec<Script> {
    let mut seen = HashSet::new();
    let mut scripts = Vec::new();

    for dir in search_path {
        let mode_dir = dir.join(format!("{mode}-mode.d"));
        let entries = match fs::read_dir(&mode_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                log_warning!(log, "Cannot read {}: {e}", private_path(&mode_dir));
                continue;
            }
        };

        let mut found: Vec<Script> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_regular_file(&entry.path()))
            .map(|entry| Script {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));

        for script in found {
            if seen.contains(&script.name) {
                log_indented!(
                    log,
                    "Ignoring {}, masked by an earlier {}",
                    private_path(&script.path),
                    script.name
                );
                continue;
            }
            log_debug!(log, "Found {}", private_path(&script.path));
            seen.insert(script.name.clone());
            scripts.push(script);
        }
    }

    scripts
}

// Follows symlinks, so a link to a script counts as a script.
fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Execute a script and wait for it.
pub fn run_script(script: &Script) -> ScriptOutcome {
    match Command::new(&script.path).status() {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(0), _) => ScriptOutcome::Success,
            (Some(code), _) => ScriptOutcome::Failed(code),
            (None, Some(signal)) => ScriptOutcome::Signalled(signal),
            (None, None) => ScriptOutcome::SpawnFailed("unknown exit status".to_string()),
        },
        Err(e) => ScriptOutcome::SpawnFailed(e.to_string()),
    }
}

/// Run `scripts` one after the other, logging each outcome.
pub fn run_scripts(scripts: &[Script], log: &Log) -> Vec<ScriptOutcome> {
    scripts
        .iter()
        .map(|script| {
            let outcome = run_script(script);
            let shown = private_path(&script.path);
            match &outcome {
                ScriptOutcome::Success => log_indented!(log, "{shown} exited with 0"),
                ScriptOutcome::Failed(code) => {
                    log_warning!(log, "{shown} exited with {code}")
                }
                ScriptOutcome::Signalled(signal) => {
                    log_warning!(log, "{shown} was killed by signal {signal}")
                }
                ScriptOutcome::SpawnFailed(reason) => {
                    log_error!(log, "Failed to run {shown}: {reason}")
                }
            }
            outcome
        })
        .collect()
}

/// Runs mode scripts on a dedicated worker thread.
///
/// `activate` only queues the mode, so a slow script never holds up scheduling, and
/// activations are processed strictly in order.
pub struct ScriptActivator {
    sender: Option<Sender<Mode>>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptActivator {
    /// Worker searching the standard XDG data directories.
    pub fn new(log: Log) -> Result<Self> {
        Self::with_search_path(script_search_path(), log)
    }

    pub fn with_search_path(search_path: Vec<PathBuf>, log: Log) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Mode>();

        let worker = thread::Builder::new()
            .name("mode-scripts".to_string())
            .spawn(move || {
                for mode in receiver {
                    let scripts = collect_scripts(&search_path, mode, &log);
                    if scripts.is_empty() {
                        log_debug!(log, "No {mode} mode scripts installed");
                        continue;
                    }
                    log_decorated!(log, "Running {} {mode} mode script(s)", scripts.len());
                    run_scripts(&scripts, &log);
                }
            })
            .context("failed to spawn script worker thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Stop accepting work and wait for queued activations to finish.
    pub fn finish(mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl ModeActivator for ScriptActivator {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn activate(&mut self, mode: Mode) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .context("script worker has already been stopped")?;
        sender
            .send(mode)
            .map_err(|_| anyhow::anyhow!("script worker thread has exited"))
    }
}
