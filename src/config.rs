//! geoprobe configuration.
//!
//! Loaded from `~/.geoprobe/config.toml` unless `--config` points elsewhere.
//! A missing default file means "use defaults"; a missing explicit file is
//! an error.
//!
//! ```toml
//! log-filter = "geoprobe=debug"
//!
//! [query]
//! enableHighAccuracy = true
//! timeout = 5000
//!
//! [device]
//! permission = "prompt"
//! prompt-answer = "granted"
//! online = false
//!
//! [[device.script]]
//! latency-ms = 6000
//!
//! [[device.timeline]]
//! at-ms = 1500
//! online = true
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::PositionOptions;
use crate::platform::simulated::DeviceProfile;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// geoprobe configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// `tracing` filter directive. `GEOPROBE_LOG` overrides it.
    pub log_filter: Option<String>,

    /// Options every query starts from before command-line overrides.
    pub query: PositionOptions,

    /// How the simulated device behaves.
    pub device: DeviceProfile,
}

impl Config {
    /// Load from `explicit` if given, otherwise from the default path.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::path().ok_or(ConfigError::NoHome)?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The config file path: `~/.geoprobe/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".geoprobe").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{PermissionState, PositionErrorCode};

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let (_dir, path) = write_config("");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn full_file_is_parsed() {
        let (_dir, path) = write_config(
            r#"
log-filter = "geoprobe=debug"

[query]
enableHighAccuracy = true
timeout = 5000

[device]
permission = "denied"
connectivity = false
latency-ms = 40

[[device.script]]
latency-ms = 6000

[[device.script]]
latency-ms = 10
error = "position_unavailable"
message = "no satellites"

[[device.timeline]]
at-ms = 1500
permission = "granted"
"#,
        );

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.log_filter.as_deref(), Some("geoprobe=debug"));
        assert_eq!(config.query.enable_high_accuracy, Some(true));
        assert_eq!(config.query.timeout, Some(5000));
        assert_eq!(config.query.maximum_age, None);

        let device = &config.device;
        assert_eq!(device.permission, PermissionState::Denied);
        assert!(!device.connectivity);
        assert!(device.location);
        assert_eq!(device.latency_ms, 40);
        assert_eq!(device.script.len(), 2);
        assert_eq!(
            device.script[1].error,
            Some(PositionErrorCode::PositionUnavailable)
        );
        assert_eq!(device.script[1].message.as_deref(), Some("no satellites"));
        assert_eq!(device.timeline[0].at_ms, 1500);
        assert_eq!(device.timeline[0].permission, Some(PermissionState::Granted));
    }

    #[test]
    fn missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_file_reports_path() {
        let (_dir, path) = write_config("[device]\npermission = \"maybe\"\n");
        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
