//! Last known location, stored as a small JSON file.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::common::constants::{APP_NAME, CACHE_FILE_NAME};
use crate::geo::location::Location;

/// File-backed cache of a single [`Location`].
#[derive(Debug, Clone)]
pub struct LocationCache {
    path: PathBuf,
}

impl LocationCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache at `$XDG_CACHE_HOME/dusklight/location.json`.
    pub fn at_default_path() -> Result<Self> {
        Ok(Self::new(default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached location.
    ///
    /// A missing file is not an error and yields `None`. An unreadable or corrupt file,
    /// or one holding out of range coordinates, is.
    pub fn load(&self) -> Result<Option<Location>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read location cache {}", self.path.display())
                });
            }
        };

        let location: Location = serde_json::from_str(&content).with_context(|| {
            format!("location cache {} is not valid JSON", self.path.display())
        })?;
        location
            .validate()
            .with_context(|| format!("location cache {} is invalid", self.path.display()))?;

        Ok(Some(location))
    }

    /// Write `location`, creating parent directories as needed.
    ///
    /// The file is created with mode 0600; a location is personal data.
    pub fn save(&self, location: &Location) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string(location).context("failed to serialize location")?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        Ok(())
    }
}

/// Default cache file path under the XDG cache directory.
pub fn default_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(cache_dir.join(APP_NAME).join(CACHE_FILE_NAME))
}
