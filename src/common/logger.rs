//! Structured logging with visual formatting.
//!
//! Output uses Unicode box drawing characters so that the daemon's log reads as a
//! sequence of connected blocks. Unlike a process-wide logger, every component holds a
//! [`Log`] handle that the bootstrap creates once and clones where it is needed. The
//! handle decides whether debug lines are shown and where the text goes: standard output
//! for the daemon, an in-memory buffer for tests.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Where formatted log text ends up.
enum Sink {
    Stdout,
    Capture(Mutex<Vec<String>>),
}

struct LogInner {
    enabled: AtomicBool,
    debug: bool,
    sink: Sink,
}

/// Cloneable logging handle.
///
/// ## Logging Conventions
///
/// - **`log_block_start!`**: starts a new conceptual block (e.g. "Loading configuration",
///   "Scheduling next transition"). Prints an empty pipe `┃` for spacing, then `┣ message`.
/// - **`log_decorated!`**: a line belonging to the current block, `┣ message`.
/// - **`log_indented!`**: nested details below a block line, `┃   message`.
/// - **`log_pipe!`**: a lone `┃`, used before `log_warning!`/`log_error!`/`log_info!` when
///   they begin a block of their own.
/// - **`log_version!`** / **`log_end!`**: startup header and termination marker.
/// - **`log_info!`, `log_warning!`, `log_error!`, `log_debug!`**: semantic
///   lines with a coloured `[LEVEL]` prefix. `log_debug!` only prints when the handle was
///   created with debug enabled.
///
/// Every macro takes the handle as its first argument: `log_info!(self.log, "...")`.
#[derive(Clone)]
pub struct Log {
    inner: Arc<LogInner>,
}

impl Log {
    fn with_sink(debug: bool, sink: Sink) -> Self {
        Self {
            inner: Arc::new(LogInner {
                enabled: AtomicBool::new(true),
                debug,
                sink,
            }),
        }
    }

    /// Handle that writes to standard output.
    pub fn stdout(debug: bool) -> Self {
        Self::with_sink(debug, Sink::Stdout)
    }

    /// Handle that records every line in memory with ANSI codes stripped.
    ///
    /// Debug output is always enabled so tests can assert on it.
    pub fn capture() -> Self {
        Self::with_sink(true, Sink::Capture(Mutex::new(Vec::new())))
    }

    /// Capturing handle that drops `log_debug!` lines like a non-debug daemon would.
    pub fn capture_without_debug() -> Self {
        Self::with_sink(false, Sink::Capture(Mutex::new(Vec::new())))
    }

    /// Lines recorded by a capturing handle. Empty for a stdout handle.
    pub fn captured(&self) -> Vec<String> {
        match &self.inner.sink {
            Sink::Capture(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            Sink::Stdout => Vec::new(),
        }
    }

    /// Enable or disable output on this handle and all of its clones.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn is_debug(&self) -> bool {
        self.inner.debug
    }

    /// Route already formatted text to the sink. Used by the macros.
    pub fn write(&self, text: &str) {
        match &self.inner.sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Sink::Capture(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.extend(strip_ansi_codes(text).lines().map(str::to_owned));
                }
            }
        }
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("enabled", &self.is_enabled())
            .field("debug", &self.is_debug())
            .finish()
    }
}

// Strip `ESC [ ... m` colour sequences.
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Shared body of the formatting macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($log:expr, $template:literal, $($arg:tt)+) => {{
        let log: &$crate::common::logger::Log = &$log;
        if log.is_enabled() {
            let message = format!($($arg)+);
            log.write(&format!($template, message));
        }
    }};
}

/// Log a decorated line within the current block.
#[macro_export]
macro_rules! log_decorated {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┣ {}\n", $($arg)+)
    };
}

/// Log an indented detail line.
#[macro_export]
macro_rules! log_indented {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┃   {}\n", $($arg)+)
    };
}

/// Log a lone pipe for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    ($log:expr) => {{
        let log: &$crate::common::logger::Log = &$log;
        if log.is_enabled() {
            log.write("┃\n");
        }
    }};
}

/// Log the first line of a new block.
#[macro_export]
macro_rules! log_block_start {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┃\n┣ {}\n", $($arg)+)
    };
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    ($log:expr) => {{
        let log: &$crate::common::logger::Log = &$log;
        if log.is_enabled() {
            let version = env!("CARGO_PKG_VERSION");
            log.write(&format!("┏ dusklight v{version} ━━╸\n"));
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    ($log:expr) => {{
        let log: &$crate::common::logger::Log = &$log;
        if log.is_enabled() {
            log.write("╹\n");
        }
    }};
}

/// Log a warning with a yellow `[WARNING]` prefix.
#[macro_export]
macro_rules! log_warning {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┣[\x1b[33mWARNING\x1b[0m] {}\n", $($arg)+)
    };
}

/// Log an error with a red `[ERROR]` prefix.
#[macro_export]
macro_rules! log_error {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┣[\x1b[31mERROR\x1b[0m] {}\n", $($arg)+)
    };
}

/// Log an error that terminates the current flow.
#[macro_export]
macro_rules! log_error_exit {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┃\n┗[\x1b[31mERROR\x1b[0m] {}\n", $($arg)+)
    };
}

/// Log an informational line with a green `[INFO]` prefix.
#[macro_export]
macro_rules! log_info {
    ($log:expr, $($arg:tt)+) => {
        $crate::__log_line!($log, "┣[\x1b[32mINFO\x1b[0m] {}\n", $($arg)+)
    };
}

/// Log a debug line. Suppressed unless the handle has debug enabled.
#[macro_export]
macro_rules! log_debug {
    ($log:expr, $($arg:tt)+) => {{
        let log: &$crate::common::logger::Log = &$log;
        if log.is_debug() {
            $crate::__log_line!(log, "┣[\x1b[32mDEBUG\x1b[0m] {}\n", $($arg)+)
        }
    }};
}
