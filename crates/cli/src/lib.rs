//! Pulse application layer.
//!
//! The `pulse` binary is the composition root: it loads [`config`], wires
//! [`observability`], builds the provider adapters and the completion client,
//! and runs the analyzer over tickets read through [`tickets`].
//!
//! The modules are exposed as a library so they can be exercised by
//! integration tests.

pub mod config;
pub mod observability;
pub mod tickets;
