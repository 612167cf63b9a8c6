//! Per-process manager for the prefd settings service.
//!
//! A `PrefCache` is the one handle a process needs: it lazily binds to the
//! service socket on first use, keeps a local copy of every key the process
//! has read, subscribes to change notices so that copy stays current, and
//! silently reconnects when the service goes away and comes back. While
//! unbound every read degrades to the caller's default and every write is
//! dropped; nothing here ever raises a connection problem at the
//! application caller.
//!
//! Create one per process, wrap it in an [`std::sync::Arc`], and hand it to
//! every consumer. Dropping the last clone closes the connection, which is
//! also how the service learns this listener is gone.

mod conn;
mod manager;

pub use manager::{BroadcastMsg, PrefCache};

// vim: ts=4
