use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;

use openwrt_bind::eventbus::Event;
use openwrt_bind::eventbus::EventBus;
use openwrt_bind::ubus::BlobmsgType;
use openwrt_bind::ubus::Dispatcher;
use openwrt_bind::ubus::LocalBus;
use openwrt_bind::ubus::MethodField;
use openwrt_bind::ubus::UbusClient;
use openwrt_bind::ubus::UbusObject;
use openwrt_bind::ubus::UbusStatus;
use openwrt_bind::Error;
use serde::Deserialize;
use serde_json::json;

use crate::commons::bus_context;
use crate::enable_logger;

#[derive(Debug, Deserialize)]
struct Status {
    up: bool,
    uptime: u64,
}

#[test]
fn service_answers_a_remote_caller() {
    enable_logger();
    let bus = LocalBus::new();
    let dispatcher = Arc::new(Dispatcher::new());
    let server_ctx = bus_context(&bus, &dispatcher);
    let weak = server_ctx.downgrade();

    let mut server = UbusClient::with_context(server_ctx);
    server
        .add_object(UbusObject::new("network.interface.wan").add_method(
            "status",
            vec![MethodField::new("verbose", BlobmsgType::Bool)],
            move |req, _| {
                let ctx = weak.upgrade().ok_or(UbusStatus::ConnectionFailed)?;
                ctx.send_reply(req, &json!({"up": true, "uptime": 3600}))
                    .map_err(|_| UbusStatus::UnknownError)
            },
        ))
        .unwrap();
    server.start().unwrap();

    let caller = UbusClient::with_context(bus_context(&bus, &dispatcher));
    let (tx, rx) = mpsc::channel();
    caller
        .invoke("network.interface.wan", "status", &json!({"verbose": 1}), 500, move |data| {
            let status: Status = serde_json::from_str(data)?;
            tx.send(status).ok();
            Ok(())
        })
        .unwrap();

    let status = rx.recv().unwrap();
    assert!(status.up);
    assert_eq!(status.uptime, 3600);

    let wrong = caller.invoke("network.interface.wan", "status", &json!({"verbose": "yes"}), 0, |_| Ok(()));
    assert!(matches!(wrong, Err(Error::Native(e)) if e.code == UbusStatus::InvalidArgument.code()));
}

#[test]
fn event_bus_mirrors_onto_the_bus() {
    enable_logger();
    let bus = LocalBus::new();
    let dispatcher = Arc::new(Dispatcher::new());
    let publisher = bus_context(&bus, &dispatcher);
    let mut subscriber = UbusClient::with_context(bus_context(&bus, &dispatcher));
    let remote_hits = Arc::new(AtomicUsize::new(0));
    let local_hits = Arc::new(AtomicUsize::new(0));

    let r = remote_hits.clone();
    subscriber
        .register_event("hotplug.*", move |event, payload| {
            assert_eq!(event, "hotplug.iface");
            let payload: serde_json::Value = serde_json::from_str(payload).unwrap();
            assert_eq!(payload["action"], "ifup");
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    subscriber.start().unwrap();

    let events = EventBus::with_remote(publisher);
    let l = local_hits.clone();
    events.subscribe("hotplug.iface", move |_| {
        l.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let event = Event {
        remote: true,
        ..Event::new("hotplug.iface", json!({"action": "ifup"}))
    };
    events.send(event, false).unwrap();

    assert_eq!(local_hits.load(Ordering::SeqCst), 1);
    assert_eq!(remote_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn closing_the_server_withdraws_its_objects() {
    enable_logger();
    let bus = LocalBus::new();
    let dispatcher = Arc::new(Dispatcher::new());
    let mut server = UbusClient::open(
        openwrt_bind::UbusConfig::default(),
        &bus,
    )
    .unwrap();
    server
        .add_object(UbusObject::new("system").add_method("board", vec![], |_, _| Ok(())))
        .unwrap();
    server.start().unwrap();
    let caller = bus_context(&bus, &dispatcher);
    caller.invoke("system", "board", &json!({}), 0, |_| Ok(())).unwrap();

    server.close().unwrap();

    let gone = caller.invoke("system", "board", &json!({}), 0, |_| Ok(()));
    assert!(matches!(gone, Err(Error::Native(e)) if e.code == UbusStatus::NotFound.code()));
    assert_eq!(bus.connected_clients(), 1);
}
