use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::UCI_CONFIG_FOLDER;
use crate::Error;
use crate::Result;

/// Settings for the hierarchical configuration store
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UciConfig {
    /// Directory where every package is one file
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory for uncommitted change deltas; native default when unset
    #[serde(default)]
    pub save_dir: Option<PathBuf>,

    /// Commit with overwrite instead of merging pending deltas
    #[serde(default)]
    pub overwrite_on_commit: bool,

    /// Fail unmarshal when a stored option's kind differs from the field's
    /// kind instead of leaving the field untouched
    #[serde(default)]
    pub strict_kinds: bool,
}

impl Default for UciConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            save_dir: None,
            overwrite_on_commit: false,
            strict_kinds: false,
        }
    }
}

impl UciConfig {
    /// Config rooted at `dir`, everything else default.
    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.config_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "uci.config_dir must not be empty".into(),
            )));
        }

        if let Some(save_dir) = &self.save_dir {
            if save_dir.as_os_str().is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "uci.save_dir must not be empty when set".into(),
                )));
            }
        }

        Ok(())
    }

    /// Path of the file backing `package`.
    pub fn package_path(
        &self,
        package: &str,
    ) -> PathBuf {
        self.config_dir.join(package)
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from(UCI_CONFIG_FOLDER)
}
