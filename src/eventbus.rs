//! In-process publish/subscribe, optionally mirrored onto the bus.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::ubus::UbusContext;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
    /// Deliver to in-process subscribers
    pub local: bool,
    /// Publish on the bus
    pub remote: bool,
}

impl Event {
    /// Local-only event.
    pub fn new(
        topic: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            local: true,
            remote: false,
        }
    }
}

pub type Subscriber = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    remote: RwLock<Option<UbusContext>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that publishes remote events through `ctx`.
    pub fn with_remote(ctx: UbusContext) -> Self {
        let bus = Self::new();
        bus.set_remote(ctx);
        bus
    }

    pub fn set_remote(
        &self,
        ctx: UbusContext,
    ) {
        *self.remote.write() = Some(ctx);
    }

    pub fn subscribe<F>(
        &self,
        topic: &str,
        subscriber: F,
    ) where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(subscriber));
    }

    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.subscribers.read().get(topic).map_or(0, Vec::len)
    }

    /// Runs the topic's subscribers in registration order.
    ///
    /// Synchronously the first failing subscriber stops the run and its
    /// error is returned. Asynchronously they run on a worker and failures
    /// are only logged.
    pub fn send_local(
        &self,
        event: Event,
        asynchronous: bool,
    ) -> Result<()> {
        let subscribers = match self.subscribers.read().get(&event.topic) {
            Some(subscribers) => subscribers.clone(),
            None => {
                debug!(topic = %event.topic, "no subscribers");
                return Ok(());
            }
        };

        if !asynchronous {
            for subscriber in &subscribers {
                subscriber(&event)?;
            }
            return Ok(());
        }

        let run = move || {
            for subscriber in &subscribers {
                if let Err(e) = subscriber(&event) {
                    warn!(topic = %event.topic, "subscriber failed: {}", e);
                }
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => {
                std::thread::Builder::new().name("eventbus".into()).spawn(run)?;
            }
        }
        Ok(())
    }

    /// Publishes `payload` as bus event `topic`.
    pub fn send_remote<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<()> {
        let remote = self.remote.read().clone();
        match remote {
            Some(ctx) => ctx.send_event(topic, payload),
            None => Err(Error::NotFound("remote bus context".into())),
        }
    }

    /// Delivers locally and/or remotely, as the event's flags say. A local
    /// failure skips the remote publish.
    pub fn send(
        &self,
        event: Event,
        asynchronous: bool,
    ) -> Result<()> {
        let remote = event.remote.then(|| (event.topic.clone(), event.payload.clone()));

        if event.local {
            self.send_local(event, asynchronous)?;
        }
        if let Some((topic, payload)) = remote {
            self.send_remote(&topic, &payload)?;
        }
        Ok(())
    }
}
