//! Bindings to the RPC/event bus.
//!
//! A [`UbusContext`] is one connection. Objects it exposes and events it
//! listens to are routed through a [`Dispatcher`] that the caller owns and
//! may share between contexts. The connection itself sits behind the
//! [`UbusTransport`] seam: libubus with the `native` feature, or the
//! in-process [`LocalBus`].

mod allocation;
mod blob;
mod client;
mod context;
mod dispatch;
mod local;
#[cfg(feature = "native")]
mod native;
mod transport;
mod types;

pub use allocation::*;
pub use blob::*;
pub use client::*;
pub use context::*;
pub use dispatch::*;
pub use local::*;
#[cfg(feature = "native")]
pub use native::*;
pub use transport::*;
pub use types::*;

#[cfg(test)]
mod context_test;
