//! Process signals and the event loop's message channel.
//!
//! Every background thread (signal handler, GeoClue listener, system event monitors)
//! talks to the event loop by sending a [`SignalMessage`] over one mpsc channel.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::common::logger::Log;
use crate::io::geoclue::LocationFix;

/// Unified message type for everything the event loop reacts to
#[derive(Debug, Clone)]
pub enum SignalMessage {
    /// Shutdown signal (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
    /// GeoClue delivered a location
    LocationFix(LocationFix),
    /// The system resumed from sleep/suspend
    Resume,
    /// The wall clock was set
    TimeChange,
}

/// Both ends of the event loop channel
pub struct SignalState {
    /// Channel receiver, owned by the event loop
    pub signal_receiver: Receiver<SignalMessage>,
    /// Channel sender, cloned into every producer thread
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    /// A channel with no OS signal handling attached.
    pub fn new() -> Self {
        let (signal_sender, signal_receiver) = mpsc::channel::<SignalMessage>();
        Self {
            signal_receiver,
            signal_sender,
        }
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Register SIGINT, SIGTERM and SIGHUP and forward them as [`SignalMessage::Shutdown`].
pub fn setup_signal_handler(log: Log) -> Result<SignalState> {
    let state = SignalState::new();

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;

    let signal_sender = state.signal_sender.clone();
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    SIGHUP => "SIGHUP",
                    _ => "unknown signal",
                };
                log_pipe!(log);
                log_info!(log, "Received {name}, shutting down");

                if signal_sender.send(SignalMessage::Shutdown).is_err() {
                    // Event loop is gone already
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(state)
}
