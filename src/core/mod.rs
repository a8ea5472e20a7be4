//! Core scheduling logic and the event loop.
//!
//! - [`mode`]: the Light/Dark enumeration
//! - [`alarm`]: the single armed transition
//! - [`controller`]: the state machine that computes, arms and fires transitions
//!
//! [`Core`] is the event loop. It owns the Controller and is the only code that
//! mutates it; every other thread reaches it through [`SignalMessage`]s.

pub mod alarm;
pub mod controller;
pub mod mode;

use anyhow::Result;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use crate::common::constants::MAX_IDLE_WAIT;
use crate::common::logger::Log;
use crate::io::signals::{SignalMessage, SignalState};

pub use controller::Controller;
pub use mode::Mode;

/// Event loop around a [`Controller`].
pub struct Core {
    controller: Controller,
    signal_state: SignalState,
    log: Log,
}

impl Core {
    pub fn new(controller: Controller, signal_state: SignalState, log: Log) -> Self {
        Self {
            controller,
            signal_state,
            log,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Run until a shutdown message arrives.
    ///
    /// Each wait is capped at [`MAX_IDLE_WAIT`] and the clock is consulted again after
    /// every wake, so a suspend or clock jump delays a due transition by at most one
    /// wait. Controller errors are logged and never end the loop; a failed calculation
    /// is retried on the Controller's schedule.
    pub fn execute(&mut self) -> Result<()> {
        log_debug!(self.log, "Entering event loop");

        loop {
            let wait = self.next_wait();
            let received = self.signal_state.signal_receiver.recv_timeout(wait);

            self.fire_due();

            match received {
                Ok(SignalMessage::Shutdown) => break,
                Ok(message) => self.handle_message(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log_warning!(self.log, "Event channel closed, stopping");
                    break;
                }
            }
        }

        log_block_start!(self.log, "Shutting down");
        Ok(())
    }

    fn next_wait(&self) -> Duration {
        [
            self.controller.time_until_alarm(),
            self.controller.time_until_retry(),
        ]
        .into_iter()
        .flatten()
        .fold(MAX_IDLE_WAIT, Duration::min)
    }

    fn fire_due(&mut self) {
        let result = self
            .controller
            .fire_due()
            .and_then(|_| self.controller.retry_due());
        if let Err(e) = result {
            log_pipe!(self.log);
            log_error!(self.log, "Failed to schedule the next transition: {e:#}");
        }
    }

    fn handle_message(&mut self, message: SignalMessage) {
        let result = match message {
            SignalMessage::LocationFix(fix) => self.controller.on_location_fix(fix.location),
            SignalMessage::Resume | SignalMessage::TimeChange => {
                log_debug!(self.log, "Rebuilding schedule after {message:?}");
                self.controller.rebuild()
            }
            SignalMessage::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            log_pipe!(self.log);
            log_error!(self.log, "Failed to schedule the next transition: {e:#}");
        }
    }
}
