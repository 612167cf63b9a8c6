//! Service-side core of prefd: the authoritative store, the listener
//! registry it notifies, the bounded diagnostic log, and the policy gating
//! mutations.

pub mod access;
pub mod defaults;
pub mod logbuf;
pub mod registry;
pub mod store;

pub use access::AccessPolicy;
pub use defaults::{DefaultsRegistry, FrozenDefaults};
pub use logbuf::{BootstrapLog, LogRing, DEFAULT_LOG_CAPACITY};
pub use registry::{ListenerHandle, ListenerId, ListenerRegistry};
pub use store::PrefStore;

// vim: ts=4
