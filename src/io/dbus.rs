//! System event monitoring.
//!
//! Two background threads watch for events after which the pending transition may
//! be wrong:
//! - sleep/resume via the systemd-logind `PrepareForSleep` signal (D-Bus)
//! - wall clock changes via timerfd with `TFD_TIMER_CANCEL_ON_SET`
//!
//! Both report to the event loop through the [`SignalMessage`] channel. Setup
//! failures are logged as warnings and the daemon runs on without the monitor.

use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use zbus::blocking::Connection;

use crate::common::logger::Log;
use crate::io::signals::SignalMessage;

/// Seconds after a resume during which clock change events are attributed to the resume.
const RESUME_GRACE_SECS: i64 = 5;

/// D-Bus proxy trait for systemd-logind Manager interface.
#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LogindManager {
    /// `start` is true before suspending and false after resuming.
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// Sleep state shared by both monitors so a resume is not reported twice.
#[derive(Clone, Default)]
struct SleepTracker {
    is_sleeping: Arc<AtomicBool>,
    /// Unix seconds of the last resume, 0 if none yet
    resume_time: Arc<AtomicI64>,
}

impl SleepTracker {
    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    fn mark_sleeping(&self) {
        self.is_sleeping.store(true, Ordering::SeqCst);
    }

    fn mark_resumed(&self) {
        self.resume_time
            .store(Self::current_timestamp(), Ordering::SeqCst);
        self.is_sleeping.store(false, Ordering::SeqCst);
    }

    /// Whether a clock change right now is explained by sleep or a recent resume.
    fn explains_time_change(&self) -> bool {
        if self.is_sleeping.load(Ordering::SeqCst) {
            return true;
        }
        let resume_time = self.resume_time.load(Ordering::SeqCst);
        resume_time != 0 && Self::current_timestamp() - resume_time <= RESUME_GRACE_SECS
    }
}

/// Start the sleep/resume and time change monitors in their own threads.
pub fn start_system_monitors(signal_sender: Sender<SignalMessage>, log: Log) {
    let tracker = SleepTracker::default();

    let spawned = thread::Builder::new()
        .name("sleep-monitor".to_string())
        .spawn({
            let signal_sender = signal_sender.clone();
            let tracker = tracker.clone();
            let log = log.clone();
            move || {
                if let Err(e) = monitor_sleep_signals(&signal_sender, &tracker, &log) {
                    log_pipe!(log);
                    log_warning!(log, "Sleep monitor stopped: {e:#}");
                    log_indented!(log, "Resume from suspend will not trigger a reschedule");
                }
            }
        });
    if let Err(e) = spawned {
        log_warning!(log, "Failed to spawn sleep monitor: {e}");
    }

    let spawned = thread::Builder::new()
        .name("time-monitor".to_string())
        .spawn({
            let log = log.clone();
            move || {
                if let Err(e) = monitor_time_changes(&signal_sender, &tracker, &log) {
                    log_pipe!(log);
                    log_warning!(log, "Time change monitor stopped: {e:#}");
                    log_indented!(log, "Clock adjustments will not trigger a reschedule");
                }
            }
        });
    if let Err(e) = spawned {
        log_warning!(log, "Failed to spawn time change monitor: {e}");
    }
}

/// Forward logind resume notifications until the bus or the event loop goes away.
fn monitor_sleep_signals(
    signal_sender: &Sender<SignalMessage>,
    tracker: &SleepTracker,
    log: &Log,
) -> Result<()> {
    let connection = Connection::system().context("failed to connect to system D-Bus")?;
    let logind_proxy =
        LogindManagerProxyBlocking::new(&connection).context("failed to create logind proxy")?;
    let sleep_signals = logind_proxy
        .receive_prepare_for_sleep()
        .context("failed to subscribe to PrepareForSleep signals")?;
    log_debug!(log, "Subscribed to systemd-logind PrepareForSleep signals");

    for signal in sleep_signals {
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                log_warning!(log, "Failed to parse PrepareForSleep signal args: {e}");
                continue;
            }
        };

        if args.start {
            tracker.mark_sleeping();
            log_pipe!(log);
            log_info!(log, "System entering sleep");
            continue;
        }

        tracker.mark_resumed();
        log_pipe!(log);
        log_info!(log, "System resumed from sleep, rescheduling");
        if signal_sender.send(SignalMessage::Resume).is_err() {
            return Ok(());
        }
    }

    Err(anyhow!("PrepareForSleep signal stream ended"))
}

/// A CLOCK_REALTIME timer set far in the future that the kernel cancels whenever the
/// clock is set.
struct TimeChangeDetector {
    timer: TimerFd,
}

impl TimeChangeDetector {
    fn new() -> nix::Result<Self> {
        let timer = TimerFd::new(ClockId::CLOCK_REALTIME, TimerFlags::empty())?;
        let detector = Self { timer };
        detector.arm()?;
        Ok(detector)
    }

    fn arm(&self) -> nix::Result<()> {
        let flags =
            TimerSetTimeFlags::TFD_TIMER_ABSTIME | TimerSetTimeFlags::TFD_TIMER_CANCEL_ON_SET;
        // Far enough to never expire, small enough not to overflow
        let far_future = TimeSpec::new(i64::MAX / 1000, 0);
        self.timer.set(Expiration::OneShot(far_future), flags)
    }

    /// Block until the clock is set.
    fn wait(&self) -> Result<()> {
        match self.timer.wait() {
            Ok(()) | Err(Errno::ECANCELED) => {
                self.arm().context("failed to re-arm time change timer")
            }
            Err(e) => Err(anyhow!("timerfd wait failed: {e}")),
        }
    }
}

fn monitor_time_changes(
    signal_sender: &Sender<SignalMessage>,
    tracker: &SleepTracker,
    log: &Log,
) -> Result<()> {
    let detector = TimeChangeDetector::new().context("failed to create timerfd")?;
    log_debug!(log, "Watching for wall clock changes");

    loop {
        detector.wait()?;

        if tracker.explains_time_change() {
            continue;
        }

        log_pipe!(log);
        log_info!(log, "System time changed, rescheduling");
        if signal_sender.send(SignalMessage::TimeChange).is_err() {
            return Ok(());
        }
    }
}
