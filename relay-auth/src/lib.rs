// Caller authentication for Relay.

pub mod core;
pub mod options;

pub use core::*;
pub use options::*;
