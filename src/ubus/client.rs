use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::UbusConfig;
use crate::ubus::Dispatcher;
use crate::ubus::EventHandler;
use crate::ubus::UbusConnector;
use crate::ubus::UbusContext;
use crate::ubus::UbusObject;
use crate::ubus::UbusRequest;
use crate::Error;
use crate::Result;

/// Where an object known to a [`UbusClient`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Known to the client, not yet on the bus
    Pending,
    /// Exposed on the bus
    Active,
}

/// Collects objects and event listeners, then exposes them all at
/// [`UbusClient::start`]. Anything added after start goes live immediately.
pub struct UbusClient {
    ctx: UbusContext,
    objects: BTreeMap<String, UbusObject>,
    listeners: BTreeMap<String, EventHandler>,
    started: bool,
    owns_context: bool,
    closed: bool,
}

impl UbusClient {
    /// Client over its own context and dispatcher; closing the client
    /// closes the context.
    pub fn open(
        config: UbusConfig,
        connector: &dyn UbusConnector,
    ) -> Result<Self> {
        let ctx = UbusContext::open(config, Arc::new(Dispatcher::new()), connector)?;
        let mut client = Self::with_context(ctx);
        client.owns_context = true;
        Ok(client)
    }

    pub fn with_context(ctx: UbusContext) -> Self {
        Self {
            ctx,
            objects: BTreeMap::new(),
            listeners: BTreeMap::new(),
            started: false,
            owns_context: false,
            closed: false,
        }
    }

    pub fn context(&self) -> &UbusContext {
        &self.ctx
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn add_object(
        &mut self,
        object: UbusObject,
    ) -> Result<()> {
        if self.objects.contains_key(&object.name) {
            return Err(Error::Validation(format!(
                "object {:?} already added",
                object.name
            )));
        }
        if self.started {
            self.ctx.add_object(object.clone())?;
        }
        self.objects.insert(object.name.clone(), object);
        Ok(())
    }

    pub fn object_state(
        &self,
        name: &str,
    ) -> Option<ObjectState> {
        if self.ctx.has_object(name) {
            Some(ObjectState::Active)
        } else if self.objects.contains_key(name) {
            Some(ObjectState::Pending)
        } else {
            None
        }
    }

    /// Withdraws the object from the bus if it is live, then forgets it.
    pub fn remove_object(
        &mut self,
        name: &str,
    ) -> Result<()> {
        if !self.objects.contains_key(name) {
            return Err(Error::NotFound(format!("object {}", name)));
        }
        if self.ctx.has_object(name) {
            self.ctx.remove_object(name)?;
        }
        self.objects.remove(name);
        Ok(())
    }

    pub fn register_event<F>(
        &mut self,
        pattern: &str,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        if self.started {
            self.ctx.register_event(pattern, handler.clone())?;
        }
        self.listeners.insert(pattern.to_string(), handler);
        Ok(())
    }

    pub fn unregister_event(
        &mut self,
        pattern: &str,
    ) -> Result<()> {
        if self.listeners.remove(pattern).is_none() {
            return Err(Error::NotFound(format!("event listener {}", pattern)));
        }
        if self.ctx.has_listener(pattern) {
            self.ctx.unregister_event(pattern)?;
        }
        Ok(())
    }

    /// Exposes every pending object and listener, then hooks the connection
    /// into the event loop. Calling it again only picks up what is still
    /// pending.
    pub fn start(&mut self) -> Result<()> {
        let mut added = 0;
        for (name, object) in &self.objects {
            if !self.ctx.has_object(name) {
                self.ctx.add_object(object.clone())?;
                added += 1;
            }
        }
        for (pattern, handler) in &self.listeners {
            if !self.ctx.has_listener(pattern) {
                self.ctx.register_event(pattern, handler.clone())?;
                added += 1;
            }
        }

        if added > 0 {
            self.ctx.add_to_loop()?;
        }
        self.started = true;
        debug!(added, "ubus client started");
        Ok(())
    }

    pub fn send_reply<T: Serialize + ?Sized>(
        &self,
        request: &UbusRequest,
        payload: &T,
    ) -> Result<()> {
        self.ctx.send_reply(request, payload)
    }

    /// Resolves `path` and calls `method` on it; `0` ms means the configured
    /// default timeout.
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
        self.ctx.invoke(path, method, params, timeout_ms, on_data)
    }

    pub fn send_event<T: Serialize + ?Sized>(
        &self,
        event: &str,
        payload: &T,
    ) -> Result<()> {
        self.ctx.send_event(event, payload)
    }

    /// Withdraws this client's objects and listeners. An owned context is
    /// closed as well. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.owns_context {
            self.ctx.close();
            return Ok(());
        }

        let mut first_error = None;
        for name in self.objects.keys() {
            if self.ctx.has_object(name) {
                if let Err(e) = self.ctx.remove_object(name) {
                    first_error.get_or_insert(e);
                }
            }
        }
        for pattern in self.listeners.keys() {
            if self.ctx.has_listener(pattern) {
                if let Err(e) = self.ctx.unregister_event(pattern) {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for UbusClient {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing ubus client failed: {}", e);
        }
    }
}
