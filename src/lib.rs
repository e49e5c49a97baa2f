//! Agent-side gateway for the krill protocol.
//!
//! Turns untyped inbound messages into deterministic state transitions for
//! three coupled concerns: device pairing with bearer-token lifecycle,
//! health probes with a time-windowed skip optimization, and remote
//! configuration updates with backup/apply/restart/rollback. The chat
//! transport, restart mechanism, and liveness probes are collaborators
//! behind traits; this crate decides when to invoke them and what to do
//! with their results.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod config_update;
pub mod error;
pub mod health;
pub mod pairing;
pub mod protocol;
pub mod server;
pub mod startup;
pub mod store;
pub mod verify;

pub use error::{Error, Result};
