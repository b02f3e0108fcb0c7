use std::sync::Arc;

use openwrt_bind::ubus::Dispatcher;
use openwrt_bind::ubus::LocalBus;
use openwrt_bind::ubus::UbusContext;
use openwrt_bind::uci::UciContext;
use openwrt_bind::UbusConfig;
use openwrt_bind::UciConfig;
use tempfile::TempDir;

use crate::enable_logger;

/// Config directory with one empty file per package.
pub fn config_dir(packages: &[&str]) -> TempDir {
    enable_logger();
    let dir = tempfile::tempdir().expect("create config dir");
    for package in packages {
        std::fs::File::create(dir.path().join(package)).expect("create package file");
    }
    dir
}

pub fn store(dir: &TempDir) -> UciContext {
    UciContext::in_memory(UciConfig::with_config_dir(dir.path()))
}

pub fn bus_context(
    bus: &LocalBus,
    dispatcher: &Arc<Dispatcher>,
) -> UbusContext {
    let config = UbusConfig {
        reconnect_interval_ms: 10,
        ..UbusConfig::default()
    };
    UbusContext::open(config, dispatcher.clone(), bus).expect("open bus context")
}
