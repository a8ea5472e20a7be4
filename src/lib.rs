//! # Dusklight Library
//!
//! Internal library for the dusklight daemon, which switches the desktop between light
//! and dark mode at civil dawn and dusk for the current location.
//!
//! ## Architecture
//!
//! - **Entry Point**: [`Dusklight`] wires everything together and runs until interrupted
//! - **Core Logic**: `core` holds the Controller state machine and the event loop
//! - **Geographic**: `geo` computes dawn, dusk and the next transition
//! - **Activation**: `activator` runs the user's mode scripts and publishes the mode on
//!   the session bus
//! - **Configuration**: `config` for the optional TOML file and environment overrides
//! - **State**: `state` persists the last known location
//! - **Infrastructure**: `io` for GeoClue, logind, timerfd, signals and the lock file;
//!   `common` for logging, constants and utilities; `time` for the clock abstraction

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod common;

pub mod activator;
pub mod config;
pub mod core;
pub mod geo;
pub mod io;
pub mod state;
pub mod time;

mod dusklight;

pub use dusklight::Dusklight;
