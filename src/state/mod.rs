//! Persistent state kept between runs.
//!
//! Only the last known location is stored. It lives under XDG_CACHE_HOME because it
//! can always be rebuilt from a fresh GeoClue fix.

pub mod location;

pub use location::LocationCache;
