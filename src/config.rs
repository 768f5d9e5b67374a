use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;
use crate::install::SERVICES_ROOT;

/// Installer configuration. Every field has a default, so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Native path of the service store.
    pub services_root: String,
    pub timeouts: Timeouts,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            services_root: SERVICES_ROOT.to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Waits against the service control manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Best-effort wait for a running service to stop before its key is deleted
    pub uninstall_stop_secs: u64,
    pub start_secs: u64,
    pub stop_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            uninstall_stop_secs: 10,
            start_secs: 30,
            stop_secs: 30,
            poll_interval_ms: 250,
        }
    }
}

impl Timeouts {
    pub fn uninstall_stop(&self) -> Duration {
        Duration::from_secs(self.uninstall_stop_secs)
    }

    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl InstallerConfig {
    /// Resolve the configuration: an explicit path must exist and parse, the
    /// per-user file is used when present, otherwise defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, InstallerError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match user_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                log::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, InstallerError> {
        let text = fs::read_to_string(path).map_err(|e| {
            InstallerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            InstallerError::Config(message) => {
                InstallerError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        log::info!("Using config from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, InstallerError> {
        let config: Self = toml::from_str(text).map_err(|e| InstallerError::Config(e.to_string()))?;
        if !config.services_root.starts_with('\\') {
            return Err(InstallerError::Config(format!(
                "services_root must be an absolute native path, got {:?}",
                config.services_root
            )));
        }
        Ok(config)
    }
}

/// `<config_dir>/ntsvc/ntsvc.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ntsvc").join("ntsvc.toml"))
}
