//! In-process bus.
//!
//! [`LocalBus`] plays the daemon for any number of contexts in one process:
//! it assigns object ids, validates arguments against method policies,
//! routes calls to the owning context and fans events out to every matching
//! registration. Failures the real daemon produces (transient completion
//! errors, lost connections, refused connects) can be injected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::errors::NativeError;
use crate::ubus::BlobBuf;
use crate::ubus::CallbackSink;
use crate::ubus::ListenerId;
use crate::ubus::MethodSpec;
use crate::ubus::ObjectAllocation;
use crate::ubus::ObjectId;
use crate::ubus::ReplyHandle;
use crate::ubus::RequestSeq;
use crate::ubus::UbusConnector;
use crate::ubus::UbusRequest;
use crate::ubus::UbusStatus;
use crate::ubus::UbusTransport;
use crate::Error;
use crate::Result;

#[derive(Clone, Default)]
pub struct LocalBus {
    state: Arc<BusState>,
}

#[derive(Default)]
struct BusState {
    objects: Mutex<HashMap<ObjectId, BusObject>>,
    clients: Mutex<HashMap<u64, Client>>,
    listeners: Mutex<Vec<BusListener>>,
    inflight: Mutex<HashMap<ReplyHandle, Vec<Vec<u8>>>>,
    faults: Mutex<Faults>,
    next_object: AtomicU32,
    next_client: AtomicU64,
    next_reply: AtomicU64,
    loop_registrations: AtomicUsize,
}

#[derive(Clone)]
struct BusObject {
    path: String,
    owner: u64,
    methods: Vec<MethodSpec>,
}

struct Client {
    sink: Arc<CallbackSink>,
    connected: bool,
}

struct BusListener {
    owner: u64,
    listener: ListenerId,
    pattern: String,
}

#[derive(Default)]
struct Faults {
    refuse_connections: bool,
    transient_completions: u32,
    failed_reconnects: u32,
}

struct PendingCall {
    object: ObjectId,
    method: String,
    frame: Vec<u8>,
}

fn status(status: UbusStatus) -> Error {
    Error::Native(status.into())
}

/// Daemon side pattern rule: a trailing `*` matches any suffix, anything
/// else matches exactly.
fn bus_matches(
    pattern: &str,
    event: &str,
) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => event.starts_with(prefix),
        None => pattern == event,
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following connect fail until reset.
    pub fn refuse_connections(
        &self,
        refuse: bool,
    ) {
        self.state.faults.lock().refuse_connections = refuse;
    }

    /// The next `n` request completions fail with `EAGAIN`.
    pub fn fail_next_completions(
        &self,
        n: u32,
    ) {
        self.state.faults.lock().transient_completions = n;
    }

    /// The next `n` reconnect attempts fail.
    pub fn fail_next_reconnects(
        &self,
        n: u32,
    ) {
        self.state.faults.lock().failed_reconnects = n;
    }

    /// Disconnects every client and signals connection loss to each.
    /// Objects and listeners stay registered, as the daemon restores them on
    /// reconnect.
    pub fn drop_connections(&self) {
        let sinks: Vec<Arc<CallbackSink>> = {
            let mut clients = self.state.clients.lock();
            clients
                .values_mut()
                .filter(|client| client.connected)
                .map(|client| {
                    client.connected = false;
                    client.sink.clone()
                })
                .collect()
        };

        debug!(clients = sinks.len(), "local bus dropped all connections");
        for sink in sinks {
            sink.on_connection_lost();
        }
    }

    pub fn object_count(&self) -> usize {
        self.state.objects.lock().len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.listeners.lock().len()
    }

    pub fn connected_clients(&self) -> usize {
        self.state.clients.lock().values().filter(|c| c.connected).count()
    }

    /// How often a connection was hooked into the event loop.
    pub fn loop_registrations(&self) -> usize {
        self.state.loop_registrations.load(Ordering::SeqCst)
    }
}

impl UbusConnector for LocalBus {
    fn connect(
        &self,
        socket: &Path,
        sink: Arc<CallbackSink>,
    ) -> Result<Arc<dyn UbusTransport>> {
        if self.state.faults.lock().refuse_connections {
            return Err(Error::Connect {
                path: socket.to_path_buf(),
                reason: UbusStatus::ConnectionFailed.message().to_string(),
            });
        }

        let client = self.state.next_client.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.clients.lock().insert(
            client,
            Client {
                sink: sink.clone(),
                connected: true,
            },
        );
        debug!(client, context = sink.context().0, "local bus client connected");

        Ok(Arc::new(LocalTransport {
            state: self.state.clone(),
            client,
            sink,
            calls: Mutex::new(HashMap::new()),
        }))
    }
}

struct LocalTransport {
    state: Arc<BusState>,
    client: u64,
    sink: Arc<CallbackSink>,
    calls: Mutex<HashMap<RequestSeq, PendingCall>>,
}

impl LocalTransport {
    fn ensure_connected(&self) -> Result<()> {
        match self.state.clients.lock().get(&self.client) {
            Some(client) if client.connected => Ok(()),
            _ => Err(status(UbusStatus::ConnectionFailed)),
        }
    }

    fn validate(
        spec: &MethodSpec,
        args: &BlobBuf,
    ) -> Result<()> {
        for (name, value) in args.fields() {
            if let Some(kind) = spec.kind_of(name) {
                if !kind.accepts(value) {
                    debug!(method = %spec.name, field = %name, ?kind, "argument fails policy");
                    return Err(status(UbusStatus::InvalidArgument));
                }
            }
        }
        Ok(())
    }

    fn owner_sink(
        &self,
        owner: u64,
    ) -> Option<Arc<CallbackSink>> {
        match self.state.clients.lock().get(&owner) {
            Some(client) if client.connected => Some(client.sink.clone()),
            _ => None,
        }
    }
}

impl UbusTransport for LocalTransport {
    fn add_object(
        &self,
        object: &ObjectAllocation,
    ) -> Result<ObjectId> {
        self.ensure_connected()?;

        let mut objects = self.state.objects.lock();
        if objects.values().any(|o| o.path == object.name()) {
            return Err(status(UbusStatus::InvalidArgument));
        }
        let id = ObjectId(self.state.next_object.fetch_add(1, Ordering::Relaxed) + 1);
        objects.insert(
            id,
            BusObject {
                path: object.name().to_string(),
                owner: self.client,
                methods: object.methods().to_vec(),
            },
        );
        trace!(path = object.name(), id = id.0, "object added to local bus");
        Ok(id)
    }

    fn remove_object(
        &self,
        id: ObjectId,
    ) -> Result<()> {
        let mut objects = self.state.objects.lock();
        match objects.get(&id) {
            Some(object) if object.owner == self.client => {
                objects.remove(&id);
                Ok(())
            }
            _ => Err(status(UbusStatus::NotFound)),
        }
    }

    fn lookup_id(
        &self,
        path: &str,
    ) -> Result<ObjectId> {
        self.ensure_connected()?;
        self.state
            .objects
            .lock()
            .iter()
            .find(|(_, object)| object.path == path)
            .map(|(id, _)| *id)
            .ok_or_else(|| status(UbusStatus::NotFound))
    }

    fn invoke_async(
        &self,
        id: ObjectId,
        method: &str,
        payload: &BlobBuf,
        seq: RequestSeq,
    ) -> Result<()> {
        self.ensure_connected()?;
        if !self.state.objects.lock().contains_key(&id) {
            return Err(status(UbusStatus::NotFound));
        }
        self.calls.lock().insert(
            seq,
            PendingCall {
                object: id,
                method: method.to_string(),
                frame: payload.encode(),
            },
        );
        Ok(())
    }

    fn complete_request(
        &self,
        seq: RequestSeq,
        _timeout_ms: u32,
    ) -> Result<()> {
        self.ensure_connected()?;
        {
            let mut faults = self.state.faults.lock();
            if faults.transient_completions > 0 {
                faults.transient_completions -= 1;
                return Err(Error::Transient(NativeError::new(
                    libc::EAGAIN,
                    "Resource temporarily unavailable",
                )));
            }
        }

        let call = self
            .calls
            .lock()
            .remove(&seq)
            .ok_or_else(|| status(UbusStatus::InvalidArgument))?;
        let object = self
            .state
            .objects
            .lock()
            .get(&call.object)
            .cloned()
            .ok_or_else(|| status(UbusStatus::NotFound))?;
        let spec = object
            .methods
            .iter()
            .find(|m| m.name == call.method)
            .ok_or_else(|| status(UbusStatus::MethodNotFound))?;
        let args = BlobBuf::decode(&call.frame).map_err(|_| status(UbusStatus::ParseError))?;
        Self::validate(spec, &args)?;

        // The owner went away without answering.
        let callee = self
            .owner_sink(object.owner)
            .ok_or_else(|| status(UbusStatus::Timeout))?;

        let reply = ReplyHandle(self.state.next_reply.fetch_add(1, Ordering::Relaxed) + 1);
        self.state.inflight.lock().insert(reply, Vec::new());
        let request = UbusRequest {
            object: object.path.clone(),
            method: call.method.clone(),
            reply,
        };
        let outcome = callee.on_method(&request, &args.to_json());
        let frames = self.state.inflight.lock().remove(&reply).unwrap_or_default();

        for frame in frames {
            let data = BlobBuf::decode(&frame).map_err(|_| status(UbusStatus::ParseError))?;
            self.sink.on_reply(seq, &data.to_json());
        }

        if outcome.is_ok() {
            Ok(())
        } else {
            Err(status(outcome))
        }
    }

    fn release_request(
        &self,
        seq: RequestSeq,
    ) {
        self.calls.lock().remove(&seq);
    }

    fn send_reply(
        &self,
        reply: ReplyHandle,
        payload: &BlobBuf,
    ) -> Result<()> {
        match self.state.inflight.lock().get_mut(&reply) {
            Some(frames) => {
                frames.push(payload.encode());
                Ok(())
            }
            None => Err(status(UbusStatus::InvalidArgument)),
        }
    }

    fn register_event(
        &self,
        pattern: &str,
        listener: ListenerId,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.state.listeners.lock().push(BusListener {
            owner: self.client,
            listener,
            pattern: pattern.to_string(),
        });
        Ok(())
    }

    fn unregister_event(
        &self,
        listener: ListenerId,
    ) -> Result<()> {
        let mut listeners = self.state.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !(l.owner == self.client && l.listener == listener));
        if listeners.len() == before {
            return Err(status(UbusStatus::NotFound));
        }
        Ok(())
    }

    fn send_event(
        &self,
        event: &str,
        payload: &BlobBuf,
    ) -> Result<()> {
        self.ensure_connected()?;
        let data = BlobBuf::decode(&payload.encode())?.to_json();

        let targets: Vec<(u64, ListenerId)> = self
            .state
            .listeners
            .lock()
            .iter()
            .filter(|l| bus_matches(&l.pattern, event))
            .map(|l| (l.owner, l.listener))
            .collect();

        trace!(event, targets = targets.len(), "local bus event");
        for (owner, listener) in targets {
            if let Some(sink) = self.owner_sink(owner) {
                sink.on_event(listener, event, &data);
            }
        }
        Ok(())
    }

    fn reconnect(
        &self,
        _socket: &Path,
    ) -> Result<()> {
        {
            let mut faults = self.state.faults.lock();
            if faults.refuse_connections || faults.failed_reconnects > 0 {
                faults.failed_reconnects = faults.failed_reconnects.saturating_sub(1);
                return Err(status(UbusStatus::ConnectionFailed));
            }
        }

        match self.state.clients.lock().get_mut(&self.client) {
            Some(client) => {
                client.connected = true;
                Ok(())
            }
            None => Err(status(UbusStatus::ConnectionFailed)),
        }
    }

    fn add_to_loop(&self) -> Result<()> {
        self.state.loop_registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {
        self.state.clients.lock().remove(&self.client);
        self.state.objects.lock().retain(|_, o| o.owner != self.client);
        self.state.listeners.lock().retain(|l| l.owner != self.client);
        self.calls.lock().clear();
        debug!(client = self.client, "local bus client disconnected");
    }
}
