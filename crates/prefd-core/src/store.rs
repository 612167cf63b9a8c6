//! The authoritative settings store and its lifecycle.
//!
//! One instance per system, shared by every manager over the call boundary.
//! Reads are open to everyone and never fail: a type mismatch or a missing
//! key degrades to the caller's default (after consulting the shipped
//! defaults table). Mutations are gated by the access policy and silently
//! ignored on denial. Every successful mutation is broadcast to the
//! listener registry after the map lock has been released, so a bundle of
//! cross-process deliveries never runs under the lock.

use serde_json::Value;
use std::sync::Arc;

use prefd_types::bridge::StorageBridge;
use prefd_types::log::LogEntry;
use prefd_types::prelude::*;
use prefd_types::types::{CallerIdentity, PrefMap, PrefType, PrefValue, ServiceState};

use crate::access::AccessPolicy;
use crate::defaults::FrozenDefaults;
use crate::logbuf::{BootstrapLog, LogRing};
use crate::registry::ListenerRegistry;

pub struct PrefStore {
	data: parking_lot::RwLock<PrefMap>,
	state: parking_lot::RwLock<ServiceState>,
	version: u32,
	defaults: FrozenDefaults,
	policy: AccessPolicy,
	registry: ListenerRegistry,
	log: parking_lot::Mutex<LogRing>,
	bridge: Arc<dyn StorageBridge>,
}

impl PrefStore {
	pub fn new(
		version: u32,
		defaults: FrozenDefaults,
		policy: AccessPolicy,
		bridge: Arc<dyn StorageBridge>,
		log_capacity: usize,
	) -> Self {
		Self {
			data: parking_lot::RwLock::new(PrefMap::new(version)),
			state: parking_lot::RwLock::new(ServiceState::Created),
			version,
			defaults,
			policy,
			registry: ListenerRegistry::new(),
			log: parking_lot::Mutex::new(LogRing::new(log_capacity)),
			bridge,
		}
	}

	// ===== Lifecycle =====

	/// Host startup callback: the service becomes externally callable.
	/// Takes over the entries of the per-process bootstrap log, exactly
	/// once; the bootstrap buffer is dead afterwards.
	pub fn on_startup(&self, bootstrap: &mut BootstrapLog) {
		{
			let mut state = self.state.write();
			if *state != ServiceState::Created {
				warn!("Ignoring startup callback in state {:?}", *state);
				return;
			}
			*state = ServiceState::Active;
		}

		info!("Starting settings service");
		bootstrap.attach_to(&mut self.log.lock());
	}

	/// Host ready callback: restore preferences through the bridge. A
	/// failed restore leaves the in-memory map authoritative; the service
	/// still reports ready and runs on whatever it has.
	pub async fn on_ready(&self) {
		{
			let state = self.state.read();
			if *state != ServiceState::Active {
				warn!("Ignoring ready callback in state {:?}", *state);
				return;
			}
		}

		info!("Finalizing settings service");
		match self.bridge.restore().await {
			Ok(disk) => {
				debug!("Restored {} preferences from the bridge", disk.len());

				// Diff under the lock, notify outside it: caches holding a
				// key the restore changed must hear about it like any other
				// write.
				let (changed, removed) = {
					let mut data = self.data.write();
					let before = data.entries.clone();
					data.merge_restored(disk);

					let changed: Vec<(String, PrefType)> = data
						.entries
						.iter()
						.filter(|(key, entry)| {
							before.get(*key).map(|b| &b.value) != Some(&entry.value)
						})
						.map(|(key, entry)| (key.clone(), entry.value.pref_type()))
						.collect();
					let removed: Vec<String> = before
						.keys()
						.filter(|key| !data.contains(key))
						.cloned()
						.collect();
					(changed, removed)
				};

				for (key, ptype) in changed {
					self.registry.broadcast_change(&key, Some(ptype));
				}
				for key in removed {
					self.registry.broadcast_change(&key, None);
				}
			}
			Err(e) => {
				warn!("Preference restore failed, keeping in-memory state: {}", e);
			}
		}

		*self.state.write() = ServiceState::Ready;
	}

	/// Host shutdown callback: push pending changes to the bridge. The
	/// process is about to die, so the state machine stays where it is.
	pub async fn on_shutdown(&self) {
		info!("Stopping settings service");
		self.save_if_dirty().await;
	}

	// ===== Read surface (unauthenticated) =====

	/// Resolve a preference. Stored value wins when its type matches the
	/// request; otherwise the shipped default for (key, type); otherwise
	/// the caller-supplied default. Never an error.
	pub fn get(
		&self,
		key: &str,
		default: Option<PrefValue>,
		ptype: PrefType,
	) -> Option<PrefValue> {
		{
			let data = self.data.read();
			if let Some(entry) = data.get(key) {
				debug!("Getting data value from key '{}'", key);
				if entry.value.matches_type(ptype) {
					return Some(entry.value.clone());
				}
				return default;
			}
		}

		debug!("Looking up data value with key '{}' from the shipped defaults", key);
		if let Some(value) = self.defaults.get(key, ptype) {
			return Some(value.clone());
		}

		default
	}

	pub fn get_bool(&self, key: &str, default: bool) -> bool {
		match self.get(key, Some(PrefValue::Bool(default)), PrefType::Bool) {
			Some(PrefValue::Bool(v)) => v,
			_ => default,
		}
	}

	pub fn get_int(&self, key: &str, default: i64) -> i64 {
		match self.get(key, Some(PrefValue::Int(default)), PrefType::Int) {
			Some(PrefValue::Int(v)) => v,
			_ => default,
		}
	}

	pub fn get_string(&self, key: &str, default: &str) -> String {
		match self.get(key, Some(PrefValue::Str(default.to_string())), PrefType::String) {
			Some(PrefValue::Str(v)) => v,
			_ => default.to_string(),
		}
	}

	pub fn get_string_list(&self, key: &str, default: Vec<String>) -> Vec<String> {
		match self.get(key, Some(PrefValue::StrList(default.clone())), PrefType::StringList) {
			Some(PrefValue::StrList(v)) => v,
			_ => default,
		}
	}

	pub fn has(&self, key: &str) -> bool {
		self.data.read().contains(key)
	}

	pub fn version(&self) -> u32 {
		self.version
	}

	pub fn state(&self) -> ServiceState {
		*self.state.read()
	}

	pub fn is_active(&self) -> bool {
		self.state() >= ServiceState::Active
	}

	pub fn is_ready(&self) -> bool {
		self.state() >= ServiceState::Ready
	}

	// ===== Mutation surface (policy-gated) =====

	/// Store a value. A denied caller is a silent no-op; a successful
	/// write is broadcast to all listeners outside the map lock.
	pub fn put(&self, caller: &CallerIdentity, key: &str, value: PrefValue, preserve: bool) {
		if !self.policy.authorize(caller) {
			debug!("Caller uid {} denied write access to '{}'", caller.uid, key);
			return;
		}

		debug!("Storing data value with key '{}'", key);
		let ptype = value.pref_type();
		self.data.write().put(key, value, preserve);

		self.registry.broadcast_change(key, Some(ptype));
	}

	/// Remove a value, silently for denied callers
	pub fn delete(&self, caller: &CallerIdentity, key: &str) {
		if !self.policy.authorize(caller) {
			debug!("Caller uid {} denied delete access to '{}'", caller.uid, key);
			return;
		}

		debug!("Deleting data value with key '{}'", key);
		self.data.write().remove(key);

		self.registry.broadcast_change(key, None);
	}

	/// Explicit save requested by an authorized caller. Returns whether a
	/// save was attempted (false for denied callers and clean maps).
	pub async fn save(&self, caller: &CallerIdentity) -> bool {
		if !self.policy.authorize(caller) {
			debug!("Caller uid {} denied save access", caller.uid);
			return false;
		}

		self.save_if_dirty().await
	}

	async fn save_if_dirty(&self) -> bool {
		let snapshot = {
			let mut data = self.data.write();
			if !data.dirty {
				debug!("No pending preference changes, skipping save");
				return false;
			}
			// Clear the flag optimistically; a concurrent put re-marks it
			// and a failed save re-marks it below.
			data.mark_saved();
			data.clone()
		};

		match self.bridge.save(&snapshot).await {
			Ok(written) => {
				debug!("Preference save completed (written={})", written);
				true
			}
			Err(e) => {
				warn!("Preference save failed, keeping changes pending: {}", e);
				self.data.write().dirty = true;
				true
			}
		}
	}

	// ===== Fan-out =====

	/// Relay an out-of-band broadcast to every listener
	pub fn send_broadcast(&self, action: &str, payload: Value) {
		self.registry.broadcast_custom(action, payload);
	}

	/// The listener registry, for session plumbing (subscribe, death path)
	pub fn registry(&self) -> &ListenerRegistry {
		&self.registry
	}

	// ===== Diagnostics =====

	pub fn add_log_entry(&self, entry: LogEntry) {
		self.log.lock().append(entry);
	}

	/// Rendered log entries, oldest first
	pub fn log_entries(&self) -> Vec<String> {
		self.log.lock().rendered()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::defaults::DefaultsRegistry;
	use crate::registry::{ListenerHandle, ListenerId};
	use async_trait::async_trait;
	use prefd_types::wire::Notice;
	use tokio::sync::mpsc;

	/// Bridge double recording saves and serving a canned restore map
	#[derive(Default)]
	struct FakeBridge {
		stored: parking_lot::Mutex<Option<PrefMap>>,
		fail: bool,
	}

	#[async_trait]
	impl StorageBridge for FakeBridge {
		async fn save(&self, map: &PrefMap) -> PrefResult<bool> {
			if self.fail {
				return Err(Error::BridgeUnavailable);
			}
			*self.stored.lock() = Some(map.clone());
			Ok(true)
		}

		async fn restore(&self) -> PrefResult<PrefMap> {
			if self.fail {
				return Err(Error::BridgeUnavailable);
			}
			Ok(self.stored.lock().clone().unwrap_or_default())
		}
	}

	fn caller() -> CallerIdentity {
		CallerIdentity::new(0, 0)
	}

	fn stranger() -> CallerIdentity {
		CallerIdentity::new(4242, 4242)
	}

	fn store_with(bridge: Arc<FakeBridge>) -> PrefStore {
		PrefStore::new(
			300_002,
			DefaultsRegistry::new().freeze(),
			AccessPolicy::new(0, 1000),
			bridge,
			150,
		)
	}

	#[tokio::test]
	async fn test_put_then_get_roundtrip() {
		let store = store_with(Arc::new(FakeBridge::default()));

		store.put(&caller(), "a", PrefValue::Int(7), false);
		assert_eq!(store.get("a", Some(PrefValue::Int(0)), PrefType::Int), Some(PrefValue::Int(7)));
		assert!(store.has("a"));

		store.delete(&caller(), "a");
		assert!(!store.has("a"));
		assert_eq!(store.get_int("a", 5), 5);
	}

	#[tokio::test]
	async fn test_unauthorized_mutation_is_silent_noop() {
		let store = store_with(Arc::new(FakeBridge::default()));

		store.put(&stranger(), "a", PrefValue::Int(7), false);
		assert!(!store.has("a"));

		store.put(&caller(), "a", PrefValue::Int(7), false);
		store.delete(&stranger(), "a");
		assert!(store.has("a"));
		assert!(!store.save(&stranger()).await);
	}

	#[tokio::test]
	async fn test_type_mismatch_returns_default() {
		let store = store_with(Arc::new(FakeBridge::default()));
		store.put(&caller(), "a", PrefValue::Str("seven".into()), false);

		assert_eq!(store.get_int("a", 5), 5);
		assert_eq!(store.get_string("a", "x"), "seven");
		assert_eq!(store.get_bool("a", true), true);
	}

	#[tokio::test]
	async fn test_absent_key_falls_back_to_shipped_default() {
		let mut defaults = DefaultsRegistry::new();
		defaults.register("ui.theme", PrefValue::Str("dark".into())).expect("register");
		let store = PrefStore::new(
			1,
			defaults.freeze(),
			AccessPolicy::new(0, 1000),
			Arc::new(FakeBridge::default()),
			150,
		);

		assert_eq!(store.get_string("ui.theme", "light"), "dark");
		// Wrong requested type skips the shipped default too
		assert_eq!(store.get_int("ui.theme", 3), 3);
		// Truly absent key yields the caller default
		assert_eq!(store.get_string("missing", "fallback"), "fallback");
		// The fallback table never makes a key "present"
		assert!(!store.has("ui.theme"));
	}

	#[tokio::test]
	async fn test_lifecycle_created_to_ready() {
		let bridge = Arc::new(FakeBridge::default());
		{
			let mut seeded = PrefMap::new(1);
			seeded.put("x", PrefValue::Int(7), false);
			*bridge.stored.lock() = Some(seeded);
		}
		let store = store_with(bridge);

		assert_eq!(store.state(), ServiceState::Created);
		assert!(!store.is_active());
		assert_eq!(store.get_int("x", 5), 5);

		let mut bootstrap = BootstrapLog::default();
		store.on_startup(&mut bootstrap);
		assert!(store.is_active());
		assert!(!store.is_ready());

		store.on_ready().await;
		assert!(store.is_ready());
		assert_eq!(store.get_int("x", 5), 7);
	}

	#[tokio::test]
	async fn test_lifecycle_is_monotonic() {
		let store = store_with(Arc::new(FakeBridge::default()));
		let mut bootstrap = BootstrapLog::default();

		// Ready before active is ignored
		store.on_ready().await;
		assert_eq!(store.state(), ServiceState::Created);

		store.on_startup(&mut bootstrap);
		store.on_ready().await;
		assert_eq!(store.state(), ServiceState::Ready);

		// A second startup cannot move the state backwards
		let mut second = BootstrapLog::default();
		store.on_startup(&mut second);
		assert_eq!(store.state(), ServiceState::Ready);
	}

	#[tokio::test]
	async fn test_restore_failure_still_reaches_ready() {
		let bridge = Arc::new(FakeBridge { stored: parking_lot::Mutex::new(None), fail: true });
		let store = store_with(bridge);

		store.put(&caller(), "kept", PrefValue::Bool(true), false);
		let mut bootstrap = BootstrapLog::default();
		store.on_startup(&mut bootstrap);
		store.on_ready().await;

		assert!(store.is_ready());
		assert_eq!(store.get_bool("kept", false), true);
	}

	#[tokio::test]
	async fn test_preserved_entry_survives_restore() {
		let bridge = Arc::new(FakeBridge::default());
		{
			let mut seeded = PrefMap::new(1);
			seeded.put("x", PrefValue::Int(1), false);
			*bridge.stored.lock() = Some(seeded);
		}
		let store = store_with(bridge);

		store.put(&caller(), "x", PrefValue::Int(99), true);
		let mut bootstrap = BootstrapLog::default();
		store.on_startup(&mut bootstrap);
		store.on_ready().await;

		assert_eq!(store.get_int("x", 0), 99);
	}

	#[tokio::test]
	async fn test_save_only_when_dirty() {
		let bridge = Arc::new(FakeBridge::default());
		let store = store_with(bridge.clone());

		// Clean map: nothing to save
		assert!(!store.save(&caller()).await);
		assert!(bridge.stored.lock().is_none());

		store.put(&caller(), "a", PrefValue::Int(1), false);
		assert!(store.save(&caller()).await);
		assert_eq!(bridge.stored.lock().as_ref().map(PrefMap::len), Some(1));

		// Saved map is clean again
		assert!(!store.save(&caller()).await);
	}

	#[tokio::test]
	async fn test_shutdown_saves_pending_changes() {
		let bridge = Arc::new(FakeBridge::default());
		let store = store_with(bridge.clone());

		store.put(&caller(), "a", PrefValue::Str("v".into()), false);
		store.on_shutdown().await;

		assert!(bridge.stored.lock().as_ref().is_some_and(|m| m.contains("a")));
	}

	#[tokio::test]
	async fn test_mutations_notify_listeners() {
		let store = store_with(Arc::new(FakeBridge::default()));
		let (tx, mut rx) = mpsc::unbounded_channel();
		store.registry().add(ListenerHandle::new(ListenerId(1), tx));

		store.put(&caller(), "k", PrefValue::Bool(true), false);
		assert_eq!(
			rx.recv().await,
			Some(Notice::Changed { key: "k".into(), ptype: PrefType::Bool })
		);

		store.delete(&caller(), "k");
		assert_eq!(rx.recv().await, Some(Notice::Removed { key: "k".into() }));

		// Denied mutations notify nobody
		store.put(&stranger(), "k", PrefValue::Bool(true), false);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_restore_notifies_listeners_of_new_keys_once() {
		let bridge = Arc::new(FakeBridge::default());
		{
			let mut seeded = PrefMap::new(1);
			seeded.put("x", PrefValue::Int(7), false);
			*bridge.stored.lock() = Some(seeded);
		}
		let store = store_with(bridge);

		let mut bootstrap = BootstrapLog::default();
		store.on_startup(&mut bootstrap);

		// Listener added while active, before the restore
		let (tx, mut rx) = mpsc::unbounded_channel();
		store.registry().add(ListenerHandle::new(ListenerId(1), tx));

		// A preserved local entry and one the restore will clobber away
		store.put(&caller(), "kept", PrefValue::Bool(true), true);
		store.put(&caller(), "gone", PrefValue::Bool(true), false);
		// Drain the two put notices
		assert!(rx.recv().await.is_some());
		assert!(rx.recv().await.is_some());

		store.on_ready().await;

		let mut notices = vec![
			rx.recv().await.expect("first restore notice"),
			rx.recv().await.expect("second restore notice"),
		];
		notices.sort_by_key(|n| match n {
			Notice::Changed { key, .. } | Notice::Removed { key } => key.clone(),
			_ => String::new(),
		});
		assert_eq!(notices[0], Notice::Removed { key: "gone".into() });
		assert_eq!(notices[1], Notice::Changed { key: "x".into(), ptype: PrefType::Int });

		// Exactly once: nothing further queued
		assert!(rx.try_recv().is_err());
		// The preserved key kept its value and produced no notice
		assert_eq!(store.get_bool("kept", false), true);
	}

	#[tokio::test]
	async fn test_log_entries_render_in_order() {
		let store = store_with(Arc::new(FakeBridge::default()));
		store.add_log_entry(LogEntry::new(prefd_types::log::LogLevel::Info, "t", "one"));
		store.add_log_entry(LogEntry::new(prefd_types::log::LogLevel::Error, "t", "two"));

		let rendered = store.log_entries();
		assert_eq!(rendered.len(), 2);
		assert!(rendered[0].starts_with("I/t"));
		assert!(rendered[1].starts_with("E/t"));
	}
}

// vim: ts=4
