// -
// UCI store

/// Directory holding one file per configuration package
pub const UCI_CONFIG_FOLDER: &str = "/etc/config";

/// Prefix libuci uses for generated anonymous section names
pub(crate) const ANONYMOUS_SECTION_PREFIX: &str = "cfg";

// -
// ubus bus

/// Well-known socket of the ubus daemon
pub const DEFAULT_UBUS_SOCK: &str = "/var/run/ubus/ubus.sock";

/// Completion attempts for an async invoke before the error is surfaced
pub const DEFAULT_INVOKE_RETRIES: u32 = 5;

/// Pause between two native reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;

pub const DEFAULT_INVOKE_TIMEOUT_MS: u32 = 3000;

/// Environment prefix for configuration overrides, e.g. `OPENWRT__UBUS__SOCKET_PATH`
pub(crate) const ENV_PREFIX: &str = "OPENWRT";
