//! Shell configuration
//!
//! Loaded from JSON. Every field is optional:
//!
//! ```json
//! {
//!   "environment": {"USER": "guest", "HOME": "/home/guest"},
//!   "fstab": [
//!     {"device_spec": "base", "mount_point": "/", "fs_type": "jfs"},
//!     {"device_spec": "scratch", "mount_point": "/tmp", "fs_type": "tmpfs"},
//!     {"device_spec": "files", "mount_point": "/home", "fs_type": "wsfs"}
//!   ],
//!   "motd": "cat /etc/motd"
//! }
//! ```

use crate::error::ConfigError;
use crate::shell::environment::{Environment, STATUS};
use crate::shell::programs;
use crate::vfs::{Devices, FstabEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Device name of the built-in static tree
pub const BASE_DEVICE: &str = "base";

/// Search path when none is configured
pub const DEFAULT_PATH: &str = "/bin/:/usr/bin/";

/// Devices every host provides: the base tree under [`BASE_DEVICE`].
/// Hosts add a fetcher and a store on top for remote and persisted mounts.
pub fn stock_devices() -> Devices {
    Devices::new().with_tree(BASE_DEVICE, programs::base_tree())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Variables merged over the built-in defaults
    pub environment: BTreeMap<String, String>,
    /// Mounts, in mount order
    pub fstab: Vec<FstabEntry>,
    /// Command run once at startup
    pub motd: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        let environment = [
            ("USER", "guest"),
            ("HOSTNAME", "vsh"),
            ("HOME", "/home"),
            ("PS1", "\\u@\\h:\\w$ "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            environment,
            fstab: vec![
                FstabEntry::new(BASE_DEVICE, "/", "jfs", "rw"),
                FstabEntry::new("scratch", "/tmp", "tmpfs", "rw"),
            ],
            motd: Some("cat /etc/motd".to_string()),
        }
    }
}

impl ShellConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), mounts = config.fstab.len(), "loaded config");
        Ok(config)
    }

    /// Starting environment: `?=0`, `PWD` at home (or `/`), the default
    /// `PATH`, then the configured variables on top
    pub fn initial_environment(&self) -> Environment {
        let home = self
            .environment
            .get("HOME")
            .cloned()
            .unwrap_or_else(|| "/".to_string());

        let mut env = Environment::with_vars([
            (STATUS.to_string(), "0".to_string()),
            ("PWD".to_string(), home),
            ("PATH".to_string(), DEFAULT_PATH.to_string()),
        ]);
        for (key, value) in &self.environment {
            env.set(key.clone(), value.clone());
        }
        env
    }
}
