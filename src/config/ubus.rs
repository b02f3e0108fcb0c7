use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_INVOKE_RETRIES;
use crate::constants::DEFAULT_INVOKE_TIMEOUT_MS;
use crate::constants::DEFAULT_RECONNECT_INTERVAL_MS;
use crate::constants::DEFAULT_UBUS_SOCK;
use crate::Error;
use crate::Result;

/// Settings for the RPC/event bus connection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UbusConfig {
    /// Local socket of the bus daemon; every context connects here
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Install the connection-lost recovery loop
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    /// Fixed pause between reconnect attempts (milliseconds)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Give up after this many reconnect attempts (0 means retry until success)
    #[serde(default)]
    pub reconnect_max_attempts: u32,

    /// Completion attempts for one invoke while the native layer reports a
    /// transient failure
    #[serde(default = "default_invoke_retries")]
    pub invoke_retries: u32,

    /// Timeout used by callers that do not pass one (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u32,
}

impl Default for UbusConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            reconnect: default_reconnect(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_max_attempts: 0,
            invoke_retries: default_invoke_retries(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl UbusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "ubus.socket_path must not be empty".into(),
            )));
        }

        if self.invoke_retries < 1 {
            return Err(Error::Config(ConfigError::Message(
                "ubus.invoke_retries must be at least 1".into(),
            )));
        }

        if self.reconnect_interval_ms < 1 {
            return Err(Error::Config(ConfigError::Message(
                "ubus.reconnect_interval_ms must be at least 1ms".into(),
            )));
        }

        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_UBUS_SOCK)
}
fn default_reconnect() -> bool {
    true
}
fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}
fn default_invoke_retries() -> u32 {
    DEFAULT_INVOKE_RETRIES
}
fn default_timeout_ms() -> u32 {
    DEFAULT_INVOKE_TIMEOUT_MS
}
