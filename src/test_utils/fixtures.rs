use std::sync::Arc;

use tempfile::TempDir;

use super::enable_logger;
use crate::config::UbusConfig;
use crate::config::UciConfig;
use crate::ubus::BlobmsgType;
use crate::ubus::Dispatcher;
use crate::ubus::LocalBus;
use crate::ubus::MethodField;
use crate::ubus::UbusContext;
use crate::ubus::UbusObject;
use crate::ubus::UbusStatus;
use crate::uci::MemoryStore;
use crate::uci::UciContext;

/// Config directory plus an in-process store, with the store kept reachable
/// for commit accounting.
pub struct UciFixture {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub ctx: UciContext,
}

impl UciFixture {
    pub fn config(&self) -> UciConfig {
        UciConfig::with_config_dir(self.dir.path())
    }
}

/// Creates an empty file for each package and a context over them.
pub fn uci_fixture(packages: &[&str]) -> UciFixture {
    uci_fixture_with(packages, |_| {})
}

pub fn uci_fixture_with(
    packages: &[&str],
    tweak: impl FnOnce(&mut UciConfig),
) -> UciFixture {
    enable_logger();

    let dir = tempfile::tempdir().expect("create config dir");
    for package in packages {
        std::fs::File::create(dir.path().join(package)).expect("create package file");
    }

    let mut config = UciConfig::with_config_dir(dir.path());
    tweak(&mut config);

    let store = Arc::new(MemoryStore::new(dir.path()));
    let ctx = UciContext::with_backend(store.clone(), config);

    UciFixture { dir, store, ctx }
}

/// In-process bus plus one dispatcher shared by every context opened on it.
pub struct BusFixture {
    pub bus: LocalBus,
    pub dispatcher: Arc<Dispatcher>,
}

impl BusFixture {
    pub fn context(&self) -> UbusContext {
        self.context_with(|_| {})
    }

    pub fn context_with(
        &self,
        tweak: impl FnOnce(&mut UbusConfig),
    ) -> UbusContext {
        let mut config = fast_bus_config();
        tweak(&mut config);
        UbusContext::open(config, self.dispatcher.clone(), &self.bus).expect("open bus context")
    }
}

pub fn bus_fixture() -> BusFixture {
    enable_logger();
    BusFixture {
        bus: LocalBus::new(),
        dispatcher: Arc::new(Dispatcher::new()),
    }
}

/// Bus settings with a short reconnect interval.
pub fn fast_bus_config() -> UbusConfig {
    UbusConfig {
        reconnect_interval_ms: 10,
        ..UbusConfig::default()
    }
}

/// Object whose `echo` method replies with its own arguments and whose
/// `fail` method answers `NotSupported`.
pub fn echo_object(
    name: &str,
    ctx: &UbusContext,
) -> UbusObject {
    let weak = ctx.downgrade();
    UbusObject::new(name)
        .add_method(
            "echo",
            vec![
                MethodField::new("message", BlobmsgType::String),
                MethodField::new("count", BlobmsgType::Int32),
            ],
            move |req, args| {
                let ctx = weak.upgrade().ok_or(UbusStatus::ConnectionFailed)?;
                ctx.send_reply(req, args).map_err(|_| UbusStatus::UnknownError)
            },
        )
        .add_method("fail", vec![], |_, _| Err(UbusStatus::NotSupported))
}
