//! Applying a mode to the desktop.
//!
//! The Controller only knows the [`ModeActivator`] trait and notifies every registered
//! activator in turn:
//!
//! - [`ScriptActivator`] runs user and system scripts for the mode
//! - [`ModeService`] publishes the mode on the session bus
//! - [`PortalSettings`] answers xdg-desktop-portal `color-scheme` queries
//!
//! Tests substitute mocks or recorders.

pub mod portal;
pub mod scripts;
pub mod service;

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::core::mode::Mode;

pub use portal::PortalSettings;
pub use scripts::ScriptActivator;
pub use service::ModeService;

/// Something that makes a mode take effect.
#[cfg_attr(test, mockall::automock)]
pub trait ModeActivator {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Apply `mode`. Implementations may do the work asynchronously.
    fn activate(&mut self, mode: Mode) -> Result<()>;
}

/// The last activated mode, shared between an activator and the bus object serving it.
///
/// `None` until the first activation.
#[derive(Debug, Clone, Default)]
pub struct SharedMode(Arc<Mutex<Option<Mode>>>);

impl SharedMode {
    pub fn get(&self) -> Option<Mode> {
        match self.0.lock() {
            Ok(mode) => *mode,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, mode: Mode) {
        match self.0.lock() {
            Ok(mut current) => *current = Some(mode),
            Err(poisoned) => *poisoned.into_inner() = Some(mode),
        }
    }
}
