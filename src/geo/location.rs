//! Geographic coordinates.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::constants::{
    MAXIMUM_LATITUDE, MAXIMUM_LONGITUDE, MINIMUM_LATITUDE, MINIMUM_LONGITUDE,
};

/// A point on Earth in decimal degrees.
///
/// Serialized as `{"lat": .., "lng": ..}`, which is also the on-disk cache format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// Build a location, rejecting non-finite or out of range coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let location = Self { lat, lng };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&self.lat) {
            bail!(
                "latitude {} must be between {MINIMUM_LATITUDE} and {MAXIMUM_LATITUDE} degrees",
                self.lat
            );
        }
        if !self.lng.is_finite() || !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&self.lng) {
            bail!(
                "longitude {} must be between {MINIMUM_LONGITUDE} and {MAXIMUM_LONGITUDE} degrees",
                self.lng
            );
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat >= 0.0 { 'N' } else { 'S' };
        let ew = if self.lng >= 0.0 { 'E' } else { 'W' };
        write!(f, "{:.4}°{ns}, {:.4}°{ew}", self.lat.abs(), self.lng.abs())
    }
}
