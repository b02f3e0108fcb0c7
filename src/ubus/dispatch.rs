//! Demultiplexing of bus callbacks.
//!
//! The bus delivers method calls, invoke replies and events on its own
//! thread. A [`Dispatcher`] holds the tables that route each of them back to
//! the handler registered for it:
//!
//! - `(object, method)` to method handler, one entry per registered method;
//! - request sequence to reply handler, removed before it runs;
//! - listener id to event handler, matched against the event name.
//!
//! The dispatcher is an owned value shared through `Arc` by every context
//! that uses it. The native side only ever holds a [`CallbackSink`].

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use glob::Pattern;
use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use parking_lot::ReentrantMutexGuard;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::ubus::ContextId;
use crate::ubus::ListenerId;
use crate::ubus::MethodHandler;
use crate::ubus::RequestSeq;
use crate::ubus::UbusObject;
use crate::ubus::UbusRequest;
use crate::ubus::UbusStatus;
use crate::Error;
use crate::Result;

/// Handler for the data of one invoke. Runs at most once.
pub type ReplyHandler = Box<dyn FnOnce(&str) -> Result<()> + Send>;

/// Handler for events: receives the event name and its JSON payload.
pub type EventHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub object: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(
        object: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            method: method.into(),
        }
    }
}

#[derive(Clone)]
struct Listener {
    context: ContextId,
    pattern: String,
    handler: EventHandler,
}

#[derive(Default)]
struct ReplyTable {
    handlers: HashMap<RequestSeq, ReplyHandler>,
    errors: HashMap<RequestSeq, Error>,
}

pub struct Dispatcher {
    methods: DashMap<MethodKey, MethodHandler>,
    replies: Mutex<ReplyTable>,
    listeners: DashMap<ListenerId, Listener>,
    next_seq: AtomicU32,
    next_listener: AtomicU64,
    next_context: AtomicU64,
    send_lock: ReentrantMutex<()>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods.len())
            .field("pending_replies", &self.pending_replies())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
            replies: Mutex::new(ReplyTable::default()),
            listeners: DashMap::new(),
            next_seq: AtomicU32::new(1),
            next_listener: AtomicU64::new(1),
            next_context: AtomicU64::new(1),
            send_lock: ReentrantMutex::new(()),
        }
    }

    pub fn register_context(&self) -> ContextId {
        ContextId(self.next_context.fetch_add(1, Ordering::Relaxed))
    }

    /// Serializes every native send, invoke and reply. Re-entrant, so a
    /// handler running under an invoke may reply or invoke again.
    pub fn send_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.send_lock.lock()
    }

    // -
    // methods

    /// Stages one entry per method of `object`.
    pub fn insert_methods(
        &self,
        object: &UbusObject,
    ) {
        for method in &object.methods {
            self.methods.insert(
                MethodKey::new(&object.name, &method.name),
                method.handler.clone(),
            );
        }
        debug!(object = %object.name, methods = object.methods.len(), "method handlers staged");
    }

    /// Removes every entry of `object`; returns how many were removed.
    pub fn remove_methods(
        &self,
        object: &str,
    ) -> usize {
        let before = self.methods.len();
        self.methods.retain(|key, _| key.object != object);
        before - self.methods.len()
    }

    pub fn has_method(
        &self,
        key: &MethodKey,
    ) -> bool {
        self.methods.contains_key(key)
    }

    /// Routes a method call. Unknown methods answer `MethodNotFound`.
    pub fn dispatch_method(
        &self,
        request: &UbusRequest,
        payload: &str,
    ) -> UbusStatus {
        let key = MethodKey::new(&request.object, &request.method);
        // Clone out of the map so the shard lock is not held while user code runs.
        let handler = match self.methods.get(&key) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(object = %key.object, method = %key.method, "no handler for method call");
                return UbusStatus::MethodNotFound;
            }
        };

        trace!(object = %key.object, method = %key.method, "dispatching method call");
        match handler(request, payload) {
            Ok(()) => UbusStatus::Ok,
            Err(status) => status,
        }
    }

    // -
    // replies

    /// Stores `handler` under a fresh sequence number.
    ///
    /// Numbers wrap but are never handed out while still pending.
    pub fn register_reply(
        &self,
        handler: ReplyHandler,
    ) -> RequestSeq {
        let mut table = self.replies.lock();
        let seq = loop {
            let candidate = RequestSeq(self.next_seq.fetch_add(1, Ordering::Relaxed));
            if candidate.0 != 0
                && !table.handlers.contains_key(&candidate)
                && !table.errors.contains_key(&candidate)
            {
                break candidate;
            }
        };
        table.handlers.insert(seq, handler);
        seq
    }

    /// Runs the reply handler of `seq` once; later replies are dropped.
    /// A handler error is kept for [`Dispatcher::finish_request`].
    pub fn dispatch_reply(
        &self,
        seq: RequestSeq,
        payload: &str,
    ) {
        let handler = self.replies.lock().handlers.remove(&seq);
        let handler = match handler {
            Some(handler) => handler,
            None => {
                debug!(seq = seq.0, "reply without pending handler dropped");
                return;
            }
        };

        if let Err(e) = handler(payload) {
            warn!(seq = seq.0, "reply handler failed: {}", e);
            self.replies.lock().errors.insert(seq, e);
        }
    }

    /// Clears whatever `seq` left behind and returns the handler error, if
    /// the handler ran and failed.
    pub fn finish_request(
        &self,
        seq: RequestSeq,
    ) -> Option<Error> {
        let mut table = self.replies.lock();
        if table.handlers.remove(&seq).is_some() {
            trace!(seq = seq.0, "request finished without reply data");
        }
        table.errors.remove(&seq)
    }

    #[cfg(test)]
    pub(crate) fn set_next_seq(
        &self,
        seq: u32,
    ) {
        self.next_seq.store(seq, Ordering::Relaxed);
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.lock().handlers.len()
    }

    // -
    // events

    pub fn add_listener(
        &self,
        context: ContextId,
        pattern: &str,
        handler: EventHandler,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(
            id,
            Listener {
                context,
                pattern: pattern.to_string(),
                handler,
            },
        );
        id
    }

    pub fn remove_listener(
        &self,
        id: ListenerId,
    ) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Drops every listener registered by `context`.
    pub fn remove_context(
        &self,
        context: ContextId,
    ) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|_, listener| listener.context != context);
        before - self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Runs `listener` when its pattern glob-matches `event`. Malformed
    /// patterns never match.
    pub fn dispatch_event(
        &self,
        listener: ListenerId,
        event: &str,
        payload: &str,
    ) -> bool {
        let Some(entry) = self.listeners.get(&listener).map(|l| l.clone()) else {
            debug!(listener = listener.0, event, "event for unknown listener dropped");
            return false;
        };

        let pattern = match Pattern::new(&entry.pattern) {
            Ok(pattern) => pattern,
            Err(e) => {
                debug!(pattern = %entry.pattern, "skipping malformed event pattern: {}", e);
                return false;
            }
        };
        if !pattern.matches(event) {
            return false;
        }

        (entry.handler)(event, payload);
        true
    }
}

/// The only thing a transport holds: routes native callbacks of one context
/// into the shared dispatcher.
pub struct CallbackSink {
    dispatcher: Arc<Dispatcher>,
    context: ContextId,
    on_lost: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl CallbackSink {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        context: ContextId,
    ) -> Self {
        Self {
            dispatcher,
            context,
            on_lost: Mutex::new(None),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn on_method(
        &self,
        request: &UbusRequest,
        payload: &str,
    ) -> UbusStatus {
        self.dispatcher.dispatch_method(request, payload)
    }

    pub fn on_reply(
        &self,
        seq: RequestSeq,
        payload: &str,
    ) {
        self.dispatcher.dispatch_reply(seq, payload)
    }

    pub fn on_event(
        &self,
        listener: ListenerId,
        event: &str,
        payload: &str,
    ) {
        self.dispatcher.dispatch_event(listener, event, payload);
    }

    pub fn on_connection_lost(&self) {
        let hook = self.on_lost.lock().clone();
        match hook {
            Some(hook) => hook(),
            None => warn!(context = self.context.0, "bus connection lost, no recovery installed"),
        }
    }

    pub(crate) fn set_connection_lost<F>(
        &self,
        hook: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_lost.lock() = Some(Arc::new(hook));
    }
}
