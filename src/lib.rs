//! Safe bindings to the OpenWrt configuration store (UCI) and RPC/event bus
//! (ubus).
//!
//! - [`uci`]: contexts, packages and sections, serde marshaling of typed
//!   records into sections, batched commands and section queries.
//! - [`ubus`]: objects, invokes, replies and events routed through an owned
//!   [`ubus::Dispatcher`], with reconnect on connection loss.
//! - [`eventbus`]: in-process topics that can be mirrored onto the bus.
//!
//! The native libraries are linked with the `native` feature. Without it
//! the in-process store and bus are used.

pub mod config;
pub mod constants;
pub mod eventbus;
pub mod handles;
pub mod ubus;
pub mod uci;

mod errors;

pub use crate::config::*;
pub use crate::errors::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
