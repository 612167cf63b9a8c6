//! Shared types and the wire protocol for the prefd settings service.
//!
//! This crate contains the foundational types shared between the service
//! crates, the client crate, and the bridge adapter implementations.
//! Extracting these into a separate crate allows adapters to compile in
//! parallel with the service itself.

pub mod bridge;
pub mod error;
pub mod log;
pub mod prelude;
pub mod types;
pub mod wire;

pub use bridge::StorageBridge;
pub use error::{Error, PrefResult};
pub use log::{LogEntry, LogLevel};
pub use types::{CallerIdentity, PrefEntry, PrefMap, PrefType, PrefValue, ServiceState};

// vim: ts=4
