//! Everything that talks to the outside world: D-Bus, process signals, the lock file.

pub mod dbus;
pub mod geoclue;
pub mod lock;
pub mod signals;
