// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installer configuration. */

use {
    crate::{
        audit::{AuditPolicy, CURRENT_BASE_SYSTEM_VERSION, CURRENT_FORMAT_VERSION},
        error::{ClickError, Result},
        version::DottedVersion,
    },
    serde::{Deserialize, Serialize},
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Configuration of an [crate::install::Installer].
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstallerConfig {
    /// Install root used when none is given on the command line.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Newest `Click-Version` accepted.
    #[serde(default = "default_format_version")]
    pub format_version: String,

    /// Newest `Click-Base-System` accepted.
    #[serde(default = "default_base_system_version")]
    pub base_system_version: String,

    /// How many times to retry a busy install root lock.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Delay between lock attempts, in milliseconds.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
}

fn default_format_version() -> String {
    CURRENT_FORMAT_VERSION.to_string()
}

fn default_base_system_version() -> String {
    CURRENT_BASE_SYSTEM_VERSION.to_string()
}

fn default_lock_retries() -> u32 {
    50
}

fn default_lock_retry_delay_ms() -> u64 {
    100
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            root: None,
            format_version: default_format_version(),
            base_system_version: default_base_system_version(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}

impl InstallerConfig {
    /// Parse a config from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ClickError::Config(e.to_string()))?;

        // Surface bad versions at load time rather than on first install.
        config.audit_policy()?;

        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| ClickError::Config(format!("reading {}: {}", path.display(), e)))?;

        Self::from_toml_str(&data)
            .map_err(|e| ClickError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the [AuditPolicy] described by this config.
    pub fn audit_policy(&self) -> Result<AuditPolicy> {
        let parse = |name: &str, value: &str| {
            DottedVersion::parse(value)
                .map_err(|e| ClickError::Config(format!("{} {:?}: {}", name, value, e)))
        };

        Ok(AuditPolicy::new(
            parse("format_version", &self.format_version)?,
            parse("base_system_version", &self.base_system_version)?,
        ))
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }
}
