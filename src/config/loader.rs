//! Supervisor configuration loading from a JSON file

use crate::config::types::{LimitPolicy, RecordFormat, Result, SpawnOptions, SupervisorError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "LIMITRUN_CONFIG";

/// Settings that do not travel on the positional command line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    pub limit_policy: LimitPolicy,
    pub record_format: RecordFormat,
    pub keep_fds: Vec<RawFd>,
}

impl SupervisorConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SupervisorError::Config(format!(
                "Failed to parse config JSON {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load from `explicit`, else from `$LIMITRUN_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve(explicit, std::env::var_os(CONFIG_ENV))
    }

    fn resolve(explicit: Option<&Path>, from_env: Option<OsString>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => from_env.filter(|v| !v.is_empty()).map(PathBuf::from),
        };

        match path {
            Some(path) => {
                let config = Self::load_from_file(&path)?;
                log::debug!("Loaded config from {}: {:?}", path.display(), config);
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            limit_policy: self.limit_policy,
            keep_fds: self.keep_fds.clone(),
        }
    }
}
