use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::config::UbusConfig;
use crate::ubus::BlobBuf;
use crate::ubus::CallbackSink;
use crate::ubus::ContextId;
use crate::ubus::Dispatcher;
use crate::ubus::EventHandler;
use crate::ubus::ListenerId;
use crate::ubus::ObjectAllocation;
use crate::ubus::ObjectId;
use crate::ubus::UbusConnector;
use crate::ubus::UbusObject;
use crate::ubus::UbusRequest;
use crate::ubus::UbusStatus;
use crate::ubus::UbusTransport;
use crate::Error;
use crate::Result;

/// Connection to the bus.
///
/// Cheap to clone; clones share one native connection. Objects and event
/// listeners registered through a context are released when it closes,
/// explicitly or when the last clone drops.
#[derive(Clone)]
pub struct UbusContext {
    inner: Arc<UbusInner>,
}

/// Non-owning handle, for method handlers that reply through the context
/// that dispatches them.
#[derive(Clone)]
pub struct WeakUbusContext {
    inner: Weak<UbusInner>,
}

impl WeakUbusContext {
    pub fn upgrade(&self) -> Option<UbusContext> {
        self.inner.upgrade().map(|inner| UbusContext { inner })
    }
}

struct UbusInner {
    id: ContextId,
    config: UbusConfig,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn UbusTransport>,
    objects: Mutex<HashMap<String, Registered>>,
    listeners: Mutex<HashMap<String, ListenerId>>,
    reconnecting: AtomicBool,
    closed: AtomicBool,
}

struct Registered {
    id: ObjectId,
    object: UbusObject,
    allocation: ObjectAllocation,
}

impl std::fmt::Debug for UbusContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UbusContext")
            .field("id", &self.inner.id)
            .field("socket_path", &self.inner.config.socket_path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl UbusContext {
    /// Connects through `connector` and routes callbacks into `dispatcher`.
    pub fn open(
        config: UbusConfig,
        dispatcher: Arc<Dispatcher>,
        connector: &dyn UbusConnector,
    ) -> Result<Self> {
        config.validate()?;

        let id = dispatcher.register_context();
        let sink = Arc::new(CallbackSink::new(dispatcher.clone(), id));
        let transport = connector
            .connect(&config.socket_path, sink.clone())
            .map_err(|e| match e {
                Error::Connect { .. } => e,
                other => Error::Connect {
                    path: config.socket_path.clone(),
                    reason: other.to_string(),
                },
            })?;

        let inner = Arc::new(UbusInner {
            id,
            config,
            dispatcher,
            transport,
            objects: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        if inner.config.reconnect {
            let weak = Arc::downgrade(&inner);
            sink.set_connection_lost(move || start_recovery(weak.clone()));
        }

        debug!(context = id.0, socket = ?inner.config.socket_path, "ubus context opened");
        Ok(Self { inner })
    }

    /// Connects to the bus daemon through libubus.
    #[cfg(feature = "native")]
    pub fn connect(config: UbusConfig) -> Result<Self> {
        Self::open(config, Arc::new(Dispatcher::new()), &crate::ubus::NativeConnector)
    }

    pub fn downgrade(&self) -> WeakUbusContext {
        WeakUbusContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn config(&self) -> &UbusConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed("ubus context"));
        }
        Ok(())
    }

    // -
    // objects

    /// Exposes `object` on the bus.
    ///
    /// Method handlers are routable before the bus acknowledges the object,
    /// so a call racing in right after registration finds its handler.
    pub fn add_object(
        &self,
        object: UbusObject,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        if object.name.trim().is_empty() {
            return Err(Error::Validation("object name must not be empty".into()));
        }

        let _send = self.inner.dispatcher.send_lock();
        let mut objects = self.inner.objects.lock();
        if objects.contains_key(&object.name) {
            return Err(Error::Validation(format!(
                "object {:?} already registered",
                object.name
            )));
        }

        let allocation = ObjectAllocation::new(&object)?;
        self.inner.dispatcher.insert_methods(&object);
        match self.inner.transport.add_object(&allocation) {
            Ok(id) => {
                debug!(object = %object.name, id = id.0, "object registered");
                objects.insert(
                    object.name.clone(),
                    Registered {
                        id,
                        object,
                        allocation,
                    },
                );
                Ok(id)
            }
            Err(e) => {
                warn!(object = %object.name, "add object failed: {}", e);
                self.inner.dispatcher.remove_methods(&object.name);
                Err(e)
            }
        }
    }

    /// Withdraws an object. Its handlers stop routing before the bus
    /// releases it, and its native memory is freed only after that.
    pub fn remove_object(
        &self,
        name: &str,
    ) -> Result<()> {
        self.ensure_open()?;

        let _send = self.inner.dispatcher.send_lock();
        let mut objects = self.inner.objects.lock();
        let registered = match objects.get(name) {
            Some(registered) => registered,
            None => return Err(Error::NotFound(format!("object {}", name))),
        };
        let id = registered.id;

        self.inner.dispatcher.remove_methods(name);
        if let Err(e) = self.inner.transport.remove_object(id) {
            // Still referenced natively: keep the allocation, give the
            // handlers back.
            warn!(object = name, "remove object failed: {}", e);
            self.inner.dispatcher.insert_methods(&registered.object);
            return Err(e);
        }

        objects.remove(name);
        debug!(object = name, id = id.0, "object removed");
        Ok(())
    }

    pub fn has_object(
        &self,
        name: &str,
    ) -> bool {
        self.inner.objects.lock().contains_key(name)
    }

    pub fn object_id(
        &self,
        name: &str,
    ) -> Option<ObjectId> {
        self.inner.objects.lock().get(name).map(|r| r.id)
    }

    pub fn lookup_id(
        &self,
        path: &str,
    ) -> Result<ObjectId> {
        self.ensure_open()?;
        let _send = self.inner.dispatcher.send_lock();
        self.inner.transport.lookup_id(path)
    }

    // -
    // events

    /// Listens for events matching `pattern`. Registering the same pattern
    /// again replaces the previous handler.
    pub fn register_event(
        &self,
        pattern: &str,
        handler: EventHandler,
    ) -> Result<ListenerId> {
        self.ensure_open()?;
        if pattern.trim().is_empty() {
            return Err(Error::Validation("event pattern must not be empty".into()));
        }
        if self.has_listener(pattern) {
            self.unregister_event(pattern)?;
        }

        let _send = self.inner.dispatcher.send_lock();
        let listener = self.inner.dispatcher.add_listener(self.inner.id, pattern, handler);
        if let Err(e) = self.inner.transport.register_event(pattern, listener) {
            warn!(pattern, "register event failed: {}", e);
            self.inner.dispatcher.remove_listener(listener);
            return Err(e);
        }

        self.inner.listeners.lock().insert(pattern.to_string(), listener);
        debug!(pattern, listener = listener.0, "event listener registered");
        Ok(listener)
    }

    pub fn unregister_event(
        &self,
        pattern: &str,
    ) -> Result<()> {
        self.ensure_open()?;

        let _send = self.inner.dispatcher.send_lock();
        let listener = self
            .inner
            .listeners
            .lock()
            .remove(pattern)
            .ok_or_else(|| Error::NotFound(format!("event listener {}", pattern)))?;

        self.inner.dispatcher.remove_listener(listener);
        self.inner.transport.unregister_event(listener)
    }

    pub fn has_listener(
        &self,
        pattern: &str,
    ) -> bool {
        self.inner.listeners.lock().contains_key(pattern)
    }

    pub fn send_event<T: Serialize + ?Sized>(
        &self,
        event: &str,
        payload: &T,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut buf = BlobBuf::new();
        buf.add_json_from(payload)?;

        let _send = self.inner.dispatcher.send_lock();
        self.inner.transport.send_event(event, &buf)
    }

    // -
    // requests

    /// Calls `method` on the object at `path`. See [`UbusContext::invoke_id`].
    pub fn invoke<T, F>(
        &self,
        path: &str,
        method: &str,
        params: &T,
        timeout_ms: u32,
        on_data: F,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&str) -> Result<()> + Send + 'static,
    {
        let id = self.lookup_id(path)?;
        self.invoke_id(id, method, params, timeout_ms, on_data)
    }

    /// Calls `method` and blocks until the call completes.
    ///
    /// `on_data` runs at most once, on the thread delivering the reply, and
    /// must not block. Its error becomes the result of the call. Transient
    /// completion failures are retried `invoke_retries` times. A timeout of
    /// `0` uses the configured default.
    pub fn invoke_id<T, F>(
        &self,
        id: ObjectId,
        method: &str,
        params: &T,
        timeout_ms: u32,
        on_data: F,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&str) -> Result<()> + Send + 'static,
    {
        self.ensure_open()?;
        let mut buf = BlobBuf::new();
        buf.add_json_from(params)?;
        let timeout_ms = if timeout_ms == 0 {
            self.inner.config.default_timeout_ms
        } else {
            timeout_ms
        };

        let dispatcher = &self.inner.dispatcher;
        let transport = &self.inner.transport;

        let _send = dispatcher.send_lock();
        let seq = dispatcher.register_reply(Box::new(on_data));
        if let Err(e) = transport.invoke_async(id, method, &buf, seq) {
            dispatcher.finish_request(seq);
            return Err(e);
        }
        trace!(object = id.0, method, seq = seq.0, "invoke started");

        let retries = self.inner.config.invoke_retries.max(1);
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match transport.complete_request(seq, timeout_ms) {
                Err(e) if e.is_transient() && attempts < retries => {
                    debug!(seq = seq.0, attempts, "transient completion failure: {}", e);
                }
                other => break other,
            }
        };

        transport.release_request(seq);
        let handler_error = dispatcher.finish_request(seq);

        match outcome {
            Err(Error::Native(e)) if e.code == UbusStatus::Timeout.code() => {
                Err(Error::Timeout { attempts })
            }
            Err(e) => Err(e),
            Ok(()) => match handler_error {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    /// Answers a method call; only valid while its handler runs.
    pub fn send_reply<T: Serialize + ?Sized>(
        &self,
        request: &UbusRequest,
        payload: &T,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut buf = BlobBuf::new();
        buf.add_json_from(payload)?;

        let _send = self.inner.dispatcher.send_lock();
        self.inner.transport.send_reply(request.reply, &buf)
    }

    /// Hooks the connection into the process event loop.
    pub fn add_to_loop(&self) -> Result<()> {
        self.ensure_open()?;
        self.inner.transport.add_to_loop()
    }

    /// Withdraws every object and listener, then drops the connection.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.release();
    }
}

impl UbusInner {
    fn release(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _send = self.dispatcher.send_lock();
        let objects: Vec<(String, Registered)> = self.objects.lock().drain().collect();
        let mut allocations = Vec::with_capacity(objects.len());
        for (name, registered) in objects {
            self.dispatcher.remove_methods(&name);
            if let Err(e) = self.transport.remove_object(registered.id) {
                warn!(object = %name, "remove object on close failed: {}", e);
            }
            allocations.push(registered.allocation);
        }

        let listeners: Vec<(String, ListenerId)> = self.listeners.lock().drain().collect();
        for (pattern, listener) in listeners {
            self.dispatcher.remove_listener(listener);
            if let Err(e) = self.transport.unregister_event(listener) {
                warn!(pattern = %pattern, "unregister event on close failed: {}", e);
            }
        }
        self.dispatcher.remove_context(self.id);

        self.transport.shutdown();
        // Only now is no native structure pointing into them.
        drop(allocations);
        debug!(context = self.id.0, "ubus context closed");
    }
}

impl Drop for UbusInner {
    fn drop(&mut self) {
        self.release();
    }
}

fn start_recovery(weak: Weak<UbusInner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if inner.closed.load(Ordering::SeqCst) || inner.reconnecting.swap(true, Ordering::SeqCst) {
        return;
    }
    let interval = inner.config.reconnect_interval();
    warn!(context = inner.id.0, "ubus connection lost, reconnecting");
    drop(inner);

    let loop_weak = weak.clone();
    let spawned = thread::Builder::new()
        .name("ubus-reconnect".into())
        .spawn(move || recovery_loop(loop_weak, interval));
    if let Err(e) = spawned {
        error!("failed to start reconnect loop: {}", e);
        if let Some(inner) = weak.upgrade() {
            inner.reconnecting.store(false, Ordering::SeqCst);
        }
    }
}

fn recovery_loop(
    weak: Weak<UbusInner>,
    interval: Duration,
) {
    let mut attempts: u32 = 0;
    loop {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.closed.load(Ordering::SeqCst) {
            inner.reconnecting.store(false, Ordering::SeqCst);
            return;
        }

        attempts += 1;
        let reconnected = {
            // no send, invoke or reply may run on a half-swapped connection
            let _send = inner.dispatcher.send_lock();
            if inner.closed.load(Ordering::SeqCst) {
                inner.reconnecting.store(false, Ordering::SeqCst);
                return;
            }
            inner.transport.reconnect(&inner.config.socket_path).map(|()| {
                if let Err(e) = inner.transport.add_to_loop() {
                    warn!("re-adding connection to event loop failed: {}", e);
                }
            })
        };
        match reconnected {
            Ok(()) => {
                info!(context = inner.id.0, attempts, "ubus reconnected");
                inner.reconnecting.store(false, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                warn!(context = inner.id.0, attempts, "ubus reconnect failed: {}", e);
                let max = inner.config.reconnect_max_attempts;
                if max > 0 && attempts >= max {
                    error!(context = inner.id.0, attempts, "giving up on ubus reconnect");
                    inner.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }

        drop(inner);
        thread::sleep(interval);
    }
}
