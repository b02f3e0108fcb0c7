//! Seam between [`UbusContext`](crate::ubus::UbusContext) and the bus.
//!
//! A transport performs native calls only. It never keeps handler state of
//! its own: everything coming back from the bus goes through the
//! [`CallbackSink`] it was connected with.

use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::ubus::BlobBuf;
use crate::ubus::CallbackSink;
use crate::ubus::ListenerId;
use crate::ubus::ObjectAllocation;
use crate::ubus::ObjectId;
use crate::ubus::ReplyHandle;
use crate::ubus::RequestSeq;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait UbusTransport: Send + Sync {
    /// Registers the object. The allocation must stay alive until
    /// [`UbusTransport::remove_object`] returned.
    fn add_object(
        &self,
        object: &ObjectAllocation,
    ) -> Result<ObjectId>;

    fn remove_object(
        &self,
        id: ObjectId,
    ) -> Result<()>;

    fn lookup_id(
        &self,
        path: &str,
    ) -> Result<ObjectId>;

    /// Starts an async call; data arrives through the sink under `seq`.
    fn invoke_async(
        &self,
        id: ObjectId,
        method: &str,
        payload: &BlobBuf,
        seq: RequestSeq,
    ) -> Result<()>;

    /// Waits for the call started under `seq`. Transient failures are
    /// reported as [`crate::Error::Transient`] and may be retried.
    fn complete_request(
        &self,
        seq: RequestSeq,
        timeout_ms: u32,
    ) -> Result<()>;

    /// Forgets the call started under `seq`.
    fn release_request(
        &self,
        seq: RequestSeq,
    );

    fn send_reply(
        &self,
        reply: ReplyHandle,
        payload: &BlobBuf,
    ) -> Result<()>;

    fn register_event(
        &self,
        pattern: &str,
        listener: ListenerId,
    ) -> Result<()>;

    fn unregister_event(
        &self,
        listener: ListenerId,
    ) -> Result<()>;

    fn send_event(
        &self,
        event: &str,
        payload: &BlobBuf,
    ) -> Result<()>;

    fn reconnect(
        &self,
        socket: &Path,
    ) -> Result<()>;

    /// Hooks the connection into the process event loop.
    fn add_to_loop(&self) -> Result<()>;

    /// Releases the native connection. Called once, last.
    fn shutdown(&self);
}

/// Opens transports. Implemented by the loopback bus and, with the
/// `native` feature, by libubus.
pub trait UbusConnector: Send + Sync {
    fn connect(
        &self,
        socket: &Path,
        sink: Arc<CallbackSink>,
    ) -> Result<Arc<dyn UbusTransport>>;
}
