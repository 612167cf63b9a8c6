//! Prefd is a cross-process settings synchronization service.
//!
//! # Features
//!
//! - One authoritative in-memory settings map, shared over a Unix domain
//!   socket by any number of manager processes
//! - Push invalidation: managers keep read-through caches that the service
//!   updates with change notices
//! - Liveness tracking: a manager dying is detected and cleaned up, a
//!   service dying is survived by lazy reconnection
//! - Two-phase bootstrap: the service is callable before preferences are
//!   loaded, and reports its lifecycle state to managers
//! - Durable storage delegated to a separate, differently-privileged
//!   bridge daemon over its own socket
//! - Bounded diagnostic log collected from before the service existed

// Re-export shared types and the bridge trait from prefd-types
pub use prefd_types::bridge;
pub use prefd_types::error;
pub use prefd_types::log;
pub use prefd_types::types;
pub use prefd_types::wire;

// Re-export the service core
pub use prefd_core::access;
pub use prefd_core::defaults;
pub use prefd_core::logbuf;
pub use prefd_core::registry;
pub use prefd_core::store;

// Local modules
pub mod app;
pub mod bridge_ipc;
pub mod bridge_service;
pub mod prelude;
pub mod sockserver;

pub use crate::app::{App, AppBuilder, AppState, VERSION, version_code};
pub use crate::bridge_ipc::IpcStorageBridge;
pub use crate::bridge_service::BridgeService;

// vim: ts=4
