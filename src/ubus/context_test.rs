use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use mockall::predicate::eq;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;

use crate::test_utils::bus_fixture;
use crate::test_utils::echo_object;
use crate::test_utils::enable_logger;
use crate::test_utils::fast_bus_config;
use crate::ubus::CallbackSink;
use crate::ubus::Dispatcher;
use crate::ubus::MethodKey;
use crate::ubus::MockUbusTransport;
use crate::ubus::ObjectId;
use crate::ubus::ReplyHandle;
use crate::ubus::UbusConnector;
use crate::ubus::UbusContext;
use crate::ubus::UbusObject;
use crate::ubus::UbusRequest;
use crate::ubus::UbusStatus;
use crate::ubus::UbusTransport;
use crate::Error;
use crate::Result;

/// Hands out one prepared mock transport.
struct MockConnector(Mutex<Option<MockUbusTransport>>);

impl UbusConnector for MockConnector {
    fn connect(
        &self,
        _socket: &Path,
        _sink: Arc<CallbackSink>,
    ) -> Result<Arc<dyn UbusTransport>> {
        let transport = self
            .0
            .lock()
            .take()
            .ok_or_else(|| Error::NotFound("mock transport".into()))?;
        Ok(Arc::new(transport))
    }
}

fn mock_context(transport: MockUbusTransport) -> UbusContext {
    enable_logger();
    let connector = MockConnector(Mutex::new(Some(transport)));
    UbusContext::open(fast_bus_config(), Arc::new(Dispatcher::new()), &connector).unwrap()
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn native_code(result: Result<()>) -> i32 {
    match result {
        Err(Error::Native(e)) => e.code,
        other => panic!("expected a native error, got {:?}", other),
    }
}

#[test]
fn invoke_round_trips_through_the_bus() {
    let fixture = bus_fixture();
    let server = fixture.context();
    let client = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    client
        .invoke("demo", "echo", &json!({"message": "hi", "count": 2}), 0, move |data| {
            tx.send(data.to_string()).ok();
            Ok(())
        })
        .unwrap();

    let reply: Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
    assert_eq!(reply, json!({"message": "hi", "count": 2}));
    assert_eq!(fixture.dispatcher.pending_replies(), 0);
}

#[test]
fn concurrent_invokes_each_get_exactly_one_reply() {
    let fixture = bus_fixture();
    let server = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let ctx = fixture.context();
            let fired = fired.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let f = fired.clone();
                    let expected = format!("{}-{}", worker, i);
                    ctx.invoke("demo", "echo", &json!({ "message": expected }), 0, move |data| {
                        let reply: Value = serde_json::from_str(data)?;
                        assert_eq!(reply["message"], json!(expected));
                        f.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 200);
    assert_eq!(fixture.dispatcher.pending_replies(), 0);
}

#[test]
fn arguments_violating_the_policy_are_rejected() {
    let fixture = bus_fixture();
    let server = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();

    let result = server.invoke("demo", "echo", &json!({"message": 5}), 0, |_| Ok(()));

    assert_eq!(native_code(result), UbusStatus::InvalidArgument.code());
}

#[test]
fn handler_status_completes_the_call() {
    let fixture = bus_fixture();
    let server = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();

    let result = server.invoke("demo", "fail", &json!({}), 0, |_| Ok(()));

    assert_eq!(native_code(result), UbusStatus::NotSupported.code());
}

#[test]
fn unknown_path_is_not_found() {
    let fixture = bus_fixture();
    let ctx = fixture.context();

    let result = ctx.invoke("missing", "status", &json!({}), 0, |_| Ok(()));

    assert_eq!(native_code(result), UbusStatus::NotFound.code());
}

#[test]
fn transient_completions_are_retried() {
    let fixture = bus_fixture();
    let server = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    fixture.bus.fail_next_completions(2);
    let f = fired.clone();
    server
        .invoke("demo", "echo", &json!({"message": "again"}), 0, move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn retries_are_bounded() {
    let fixture = bus_fixture();
    let server = fixture.context_with(|config| config.invoke_retries = 2);
    server.add_object(echo_object("demo", &server)).unwrap();

    fixture.bus.fail_next_completions(5);
    let result = server.invoke("demo", "echo", &json!({}), 0, |_| Ok(()));

    assert!(matches!(result, Err(Error::Transient(_))));
    assert_eq!(fixture.dispatcher.pending_replies(), 0);
}

#[test]
fn native_timeout_reports_attempts() {
    let mut transport = MockUbusTransport::new();
    transport.expect_invoke_async().returning(|_, _, _, _| Ok(()));
    let calls = AtomicU32::new(0);
    transport.expect_complete_request().times(2).returning(move |_, timeout| {
        assert_eq!(timeout, 250);
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::Transient(crate::NativeError::new(libc::EINTR, "Interrupted")))
        } else {
            Err(Error::Native(UbusStatus::Timeout.into()))
        }
    });
    transport.expect_release_request().times(1).return_const(());
    transport.expect_shutdown().times(1).return_const(());
    let ctx = mock_context(transport);

    let result = ctx.invoke_id(ObjectId(7), "status", &json!({}), 250, |_| Ok(()));

    assert!(matches!(result, Err(Error::Timeout { attempts: 2 })));
    assert_eq!(ctx.dispatcher().pending_replies(), 0);
}

#[test]
fn zero_timeout_uses_the_configured_default() {
    let mut transport = MockUbusTransport::new();
    transport.expect_invoke_async().returning(|_, _, _, _| Ok(()));
    transport
        .expect_complete_request()
        .with(mockall::predicate::always(), eq(fast_bus_config().default_timeout_ms))
        .times(1)
        .returning(|_, _| Ok(()));
    transport.expect_release_request().return_const(());
    transport.expect_shutdown().return_const(());
    let ctx = mock_context(transport);

    ctx.invoke_id(ObjectId(1), "status", &json!({}), 0, |_| Ok(())).unwrap();
}

#[test]
fn reply_handler_error_fails_the_invoke() {
    let fixture = bus_fixture();
    let server = fixture.context();
    server.add_object(echo_object("demo", &server)).unwrap();

    let result = server.invoke("demo", "echo", &json!({}), 0, |_| Err(Error::Handler("rejected".into())));

    assert!(matches!(result, Err(Error::Handler(msg)) if msg == "rejected"));
}

#[test]
fn overlapping_patterns_each_fire_once() {
    let fixture = bus_fixture();
    let listener = fixture.context();
    let sender = fixture.context();
    let hits = Arc::new(Mutex::new(Vec::new()));

    let wildcard = hits.clone();
    listener
        .register_event(
            "foo.*",
            Arc::new(move |event: &str, _: &str| wildcard.lock().push(format!("wildcard:{}", event))),
        )
        .unwrap();
    let exact = hits.clone();
    listener
        .register_event(
            "foo.bar",
            Arc::new(move |event: &str, payload: &str| {
                let payload: Value = serde_json::from_str(payload).unwrap();
                assert_eq!(payload, json!({"up": true}));
                exact.lock().push(format!("exact:{}", event));
            }),
        )
        .unwrap();

    sender.send_event("foo.bar", &json!({"up": true})).unwrap();
    sender.send_event("foo.baz", &json!({"up": true})).unwrap();

    let mut seen = hits.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["exact:foo.bar", "wildcard:foo.bar", "wildcard:foo.baz"]);
}

#[test]
fn registering_a_pattern_again_replaces_its_handler() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let f = first.clone();
    ctx.register_event("wan.*", Arc::new(move |_: &str, _: &str| {
        f.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    let s = second.clone();
    ctx.register_event("wan.*", Arc::new(move |_: &str, _: &str| {
        s.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    ctx.send_event("wan.up", &json!({})).unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.bus.listener_count(), 1);
}

#[test]
fn unregistered_listener_stops_firing() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    ctx.register_event("lan.*", Arc::new(move |_: &str, _: &str| {
        h.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    ctx.unregister_event("lan.*").unwrap();
    ctx.send_event("lan.up", &json!({})).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!ctx.has_listener("lan.*"));
    assert_eq!(fixture.dispatcher.listener_count(), 0);
    assert!(matches!(ctx.unregister_event("lan.*"), Err(Error::NotFound(_))));
}

#[test]
fn failed_add_object_leaves_no_handlers_behind() {
    let mut transport = MockUbusTransport::new();
    transport
        .expect_add_object()
        .times(1)
        .returning(|_| Err(Error::Native(UbusStatus::InvalidArgument.into())));
    transport.expect_shutdown().return_const(());
    let ctx = mock_context(transport);

    let result = ctx.add_object(echo_object("svc", &ctx));

    assert!(matches!(result, Err(Error::Native(_))));
    assert!(!ctx.has_object("svc"));
    assert!(!ctx.dispatcher().has_method(&MethodKey::new("svc", "echo")));
}

#[test]
fn failed_remove_object_keeps_the_object_routable() {
    let mut transport = MockUbusTransport::new();
    transport.expect_add_object().returning(|_| Ok(ObjectId(3)));
    transport
        .expect_remove_object()
        .with(eq(ObjectId(3)))
        .returning(|_| Err(Error::Native(UbusStatus::UnknownError.into())));
    transport.expect_shutdown().return_const(());
    let ctx = mock_context(transport);
    ctx.add_object(echo_object("svc", &ctx)).unwrap();

    assert!(ctx.remove_object("svc").is_err());

    assert!(ctx.has_object("svc"));
    assert!(ctx.dispatcher().has_method(&MethodKey::new("svc", "echo")));
}

#[test]
fn duplicate_or_unnamed_objects_are_rejected() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    ctx.add_object(echo_object("demo", &ctx)).unwrap();

    assert!(matches!(ctx.add_object(echo_object("demo", &ctx)), Err(Error::Validation(_))));
    assert!(matches!(ctx.add_object(echo_object(" ", &ctx)), Err(Error::Validation(_))));
    assert!(matches!(ctx.remove_object("other"), Err(Error::NotFound(_))));
}

#[test]
fn close_releases_everything_once() {
    let mut transport = MockUbusTransport::new();
    transport.expect_add_object().returning(|_| Ok(ObjectId(3)));
    transport
        .expect_remove_object()
        .with(eq(ObjectId(3)))
        .times(1)
        .returning(|_| Ok(()));
    transport.expect_register_event().returning(|_, _| Ok(()));
    transport.expect_unregister_event().times(1).returning(|_| Ok(()));
    transport.expect_shutdown().times(1).return_const(());
    let ctx = mock_context(transport);
    ctx.add_object(echo_object("svc", &ctx)).unwrap();
    ctx.register_event("svc.*", Arc::new(|_: &str, _: &str| {})).unwrap();

    ctx.close();
    ctx.close();

    assert!(ctx.is_closed());
    assert!(!ctx.dispatcher().has_method(&MethodKey::new("svc", "echo")));
    assert_eq!(ctx.dispatcher().listener_count(), 0);
}

#[test]
fn closed_context_refuses_work() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    ctx.add_object(echo_object("demo", &ctx)).unwrap();

    ctx.close();

    assert_eq!(fixture.bus.object_count(), 0);
    assert_eq!(fixture.bus.connected_clients(), 0);
    assert!(matches!(
        ctx.invoke("demo", "echo", &json!({}), 0, |_| Ok(())),
        Err(Error::Closed(_))
    ));
    assert!(matches!(ctx.send_event("x", &json!({})), Err(Error::Closed(_))));
}

#[test]
fn dropping_the_last_clone_releases_the_connection() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    ctx.add_object(echo_object("demo", &ctx)).unwrap();
    let clone = ctx.clone();

    drop(ctx);
    assert_eq!(fixture.bus.object_count(), 1);
    drop(clone);

    assert_eq!(fixture.bus.object_count(), 0);
    assert_eq!(fixture.bus.connected_clients(), 0);
}

#[test]
fn reply_outside_a_handler_is_rejected() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    let request = UbusRequest {
        object: "demo".into(),
        method: "echo".into(),
        reply: ReplyHandle(999),
    };

    assert_eq!(
        native_code(ctx.send_reply(&request, &json!({}))),
        UbusStatus::InvalidArgument.code()
    );
}

#[test]
fn refused_connection_is_a_connect_error() {
    let fixture = bus_fixture();
    fixture.bus.refuse_connections(true);

    let result = UbusContext::open(fast_bus_config(), fixture.dispatcher.clone(), &fixture.bus);

    assert!(matches!(result, Err(Error::Connect { .. })));
}

#[test]
fn lost_connection_is_recovered() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    ctx.add_object(echo_object("demo", &ctx)).unwrap();
    let registrations = fixture.bus.loop_registrations();

    fixture.bus.fail_next_reconnects(3);
    fixture.bus.drop_connections();

    assert!(wait_until(|| fixture.bus.connected_clients() == 1));
    assert!(wait_until(|| fixture.bus.loop_registrations() == registrations + 1));
    ctx.invoke("demo", "echo", &json!({"message": "back"}), 0, |_| Ok(()))
        .unwrap();
}

#[test]
fn reconnect_waits_for_a_pending_invoke() {
    let fixture = bus_fixture();
    let ctx = fixture.context();
    let entered = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let (e, r) = (entered.clone(), release.clone());
    ctx.add_object(UbusObject::new("slow").add_method("hold", vec![], move |_, _| {
        e.store(true, Ordering::SeqCst);
        while !r.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }))
    .unwrap();
    let registrations = fixture.bus.loop_registrations();

    let caller = ctx.clone();
    let pending = thread::spawn(move || {
        let _ = caller.invoke("slow", "hold", &json!({}), 0, |_| Ok(()));
    });
    assert!(wait_until(|| entered.load(Ordering::SeqCst)));

    fixture.bus.drop_connections();
    thread::sleep(Duration::from_millis(100));

    // the invoke still holds the send lock, so the connection stays down
    assert_eq!(fixture.bus.connected_clients(), 0);
    assert_eq!(fixture.bus.loop_registrations(), registrations);

    release.store(true, Ordering::SeqCst);
    pending.join().unwrap();

    assert!(wait_until(|| fixture.bus.connected_clients() == 1));
    assert!(wait_until(|| fixture.bus.loop_registrations() == registrations + 1));
}

#[test]
fn recovery_gives_up_after_max_attempts() {
    let fixture = bus_fixture();
    let _ctx = fixture.context_with(|config| config.reconnect_max_attempts = 2);

    fixture.bus.fail_next_reconnects(10);
    fixture.bus.drop_connections();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(fixture.bus.connected_clients(), 0);
    assert_eq!(fixture.bus.loop_registrations(), 0);
}

#[test]
fn recovery_is_off_when_disabled() {
    let fixture = bus_fixture();
    let _ctx = fixture.context_with(|config| config.reconnect = false);

    fixture.bus.drop_connections();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(fixture.bus.connected_clients(), 0);
}
