//! Solar geometry: where we are and when the sky changes.
//!
//! - [`location`]: validated coordinates, also the cache record format
//! - [`solar`]: civil dawn and dusk for one day, with a polar guard
//! - [`transition`]: the search for the next light/dark switch

pub mod location;
pub mod solar;
pub mod transition;

pub use location::Location;
pub use solar::{DayBounds, SolarError, day_bounds};
pub use transition::{Transition, next_change};
