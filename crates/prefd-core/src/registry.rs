//! Listener registry and change fan-out.
//!
//! Tracks the push channel of every subscribed manager. A listener is
//! identified by its connection; the session owning the connection removes
//! it when the socket closes, which is the death-detection path. Delivery
//! is best-effort: a closed channel is skipped, a failed send is dropped,
//! and no ordering is guaranteed across listeners.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

use prefd_types::prelude::*;
use prefd_types::types::PrefType;
use prefd_types::wire::Notice;

/// Identity of a remote listener (one per manager connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// A registered listener: its identity plus the channel notices travel on.
/// The channel closing is the liveness signal.
#[derive(Debug)]
pub struct ListenerHandle {
	pub id: ListenerId,
	sender: mpsc::UnboundedSender<Notice>,
}

impl ListenerHandle {
	pub fn new(id: ListenerId, sender: mpsc::UnboundedSender<Notice>) -> Self {
		Self { id, sender }
	}

	/// Liveness ping: a closed channel means the owning session is gone
	pub fn is_live(&self) -> bool {
		!self.sender.is_closed()
	}
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
	listeners: parking_lot::RwLock<HashMap<ListenerId, ListenerHandle>>,
}

impl ListenerRegistry {
	pub fn new() -> Self {
		Self { listeners: parking_lot::RwLock::new(HashMap::new()) }
	}

	/// Register a listener. Idempotent by identity: a second add for the
	/// same id is ignored and the original channel is kept.
	pub fn add(&self, handle: ListenerHandle) {
		let mut listeners = self.listeners.write();
		if listeners.contains_key(&handle.id) {
			debug!("Listener {:?} already registered, ignoring", handle.id);
			return;
		}
		debug!("Listener {:?} registered", handle.id);
		listeners.insert(handle.id, handle);
	}

	/// Remove a listener. Serves both explicit unsubscribes and the death
	/// path; removing an unknown id is a no-op.
	pub fn remove(&self, id: ListenerId) {
		if self.listeners.write().remove(&id).is_some() {
			debug!("Listener {:?} removed", id);
		}
	}

	pub fn len(&self) -> usize {
		self.listeners.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.read().is_empty()
	}

	/// Notify all live listeners that a key changed (`Some(ptype)`) or was
	/// removed (`None`). Returns the number of listeners reached.
	pub fn broadcast_change(&self, key: &str, ptype: Option<PrefType>) -> usize {
		let notice = match ptype {
			Some(ptype) => Notice::Changed { key: key.to_string(), ptype },
			None => Notice::Removed { key: key.to_string() },
		};
		debug!("Broadcasting settings change on key '{}'", key);
		self.fan_out(notice)
	}

	/// Relay an out-of-band signal to all live listeners
	pub fn broadcast_custom(&self, action: &str, payload: Value) -> usize {
		debug!("Sending settings broadcast using action '{}'", action);
		self.fan_out(Notice::Broadcast { action: action.to_string(), payload })
	}

	fn fan_out(&self, notice: Notice) -> usize {
		let listeners = self.listeners.read();
		let mut delivered = 0;
		for handle in listeners.values() {
			// Stale handles are skipped here, not removed; removal happens
			// only when the owning session reports the death.
			if !handle.is_live() {
				continue;
			}
			if handle.sender.send(notice.clone()).is_ok() {
				delivered += 1;
			}
		}
		delivered
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn listener(id: u64) -> (ListenerHandle, mpsc::UnboundedReceiver<Notice>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(ListenerHandle::new(ListenerId(id), tx), rx)
	}

	#[tokio::test]
	async fn test_add_is_idempotent() {
		let registry = ListenerRegistry::new();
		let (first, mut rx) = listener(1);
		registry.add(first);

		// Second add with the same identity must not replace the channel
		let (dup, _dup_rx) = listener(1);
		registry.add(dup);
		assert_eq!(registry.len(), 1);

		registry.broadcast_change("k", Some(PrefType::Int));
		assert!(matches!(rx.recv().await, Some(Notice::Changed { .. })));
	}

	#[tokio::test]
	async fn test_broadcast_skips_dead_listener() {
		let registry = ListenerRegistry::new();
		let (alive, mut rx) = listener(1);
		let (dead, dead_rx) = listener(2);
		registry.add(alive);
		registry.add(dead);
		drop(dead_rx);

		let delivered = registry.broadcast_change("k", None);
		assert_eq!(delivered, 1);
		assert!(matches!(rx.recv().await, Some(Notice::Removed { .. })));

		// Skipping is not removing
		assert_eq!(registry.len(), 2);
	}

	#[tokio::test]
	async fn test_remove_is_idempotent() {
		let registry = ListenerRegistry::new();
		let (handle, _rx) = listener(1);
		registry.add(handle);

		registry.remove(ListenerId(1));
		assert!(registry.is_empty());
		registry.remove(ListenerId(1));
		assert!(registry.is_empty());
	}

	#[tokio::test]
	async fn test_custom_broadcast_reaches_all() {
		let registry = ListenerRegistry::new();
		let (a, mut rx_a) = listener(1);
		let (b, mut rx_b) = listener(2);
		registry.add(a);
		registry.add(b);

		let n = registry.broadcast_custom("reload", serde_json::json!({ "scope": "all" }));
		assert_eq!(n, 2);
		for rx in [&mut rx_a, &mut rx_b] {
			match rx.recv().await {
				Some(Notice::Broadcast { action, .. }) => assert_eq!(action, "reload"),
				other => panic!("unexpected notice: {:?}", other),
			}
		}
	}
}

// vim: ts=4
