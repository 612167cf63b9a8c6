//! Adapter trait for durable preference storage.
//!
//! The store never touches disk itself; it hands the whole map to a bridge
//! at shutdown (and on explicit save) and asks for it back when the host
//! reports ready. Implementations range from a connect-once IPC client
//! talking to a differently-privileged daemon to a plain file backend used
//! by that daemon and by standalone deployments.

use async_trait::async_trait;

use crate::prelude::*;
use crate::types::PrefMap;

#[async_trait]
pub trait StorageBridge: Send + Sync {
	/// Persist the map. Returns whether anything was written (a clean map
	/// is skipped). Failure is non-fatal for the caller: the in-memory map
	/// stays authoritative.
	async fn save(&self, map: &PrefMap) -> PrefResult<bool>;

	/// Load the durable map. A missing backing store yields an empty map;
	/// an unreachable bridge yields an error the caller degrades on.
	async fn restore(&self) -> PrefResult<PrefMap>;
}

// vim: ts=4
