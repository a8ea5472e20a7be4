//! Configuration validation.

use anyhow::{Result, bail};

use super::Config;
use crate::common::constants::*;

/// Reject configurations the daemon cannot act on.
pub fn validate_config(config: &Config) -> Result<()> {
    match (config.latitude, config.longitude) {
        (Some(_), None) => bail!("latitude is set but longitude is missing"),
        (None, Some(_)) => bail!("longitude is set but latitude is missing"),
        _ => {}
    }

    if let Some(lat) = config.latitude
        && !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&lat)
    {
        bail!("latitude must be between {MINIMUM_LATITUDE} and {MAXIMUM_LATITUDE} degrees (got {lat})");
    }

    if let Some(lng) = config.longitude
        && !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&lng)
    {
        bail!(
            "longitude must be between {MINIMUM_LONGITUDE} and {MAXIMUM_LONGITUDE} degrees (got {lng})"
        );
    }

    if let Some(desktop_id) = &config.desktop_id
        && desktop_id.trim().is_empty()
    {
        bail!("desktop_id must not be empty");
    }

    Ok(())
}
