//! Bindings to the hierarchical configuration store.
//!
//! A [`UciContext`] owns one native store handle. Packages loaded through it
//! are [`Package`] handles that unload on drop; sections borrow their package
//! so they can never outlive it. Typed records move in and out of sections
//! through serde: field renames name options, `#[serde(skip)]` excludes a
//! field and `#[serde(skip_serializing_if = "openwrt_bind::uci::is_empty")]`
//! gives omit-on-empty.

mod backend;
mod client;
mod command;
mod context;
mod de;
mod memory;
#[cfg(feature = "native")]
mod native;
mod query;
mod ser;
mod types;

pub use backend::*;
pub use client::*;
pub use command::*;
pub use context::*;
pub use de::from_options;
pub use memory::*;
#[cfg(feature = "native")]
pub use native::*;
pub use query::*;
pub use ser::to_options;
pub use types::*;

#[cfg(test)]
mod client_test;

/// Omit-on-empty predicate for `skip_serializing_if`.
///
/// True for the type's zero value: empty strings and collections, `false`,
/// `0`, `None`.
pub fn is_empty<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}
