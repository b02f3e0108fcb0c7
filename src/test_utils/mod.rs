//! the test_utils folder here will share fixtures between the unit tests of
//! every subsystem
mod common;
mod fixtures;

pub use common::*;
pub use fixtures::*;
