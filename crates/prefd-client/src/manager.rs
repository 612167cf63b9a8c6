//! The read-through settings cache.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, mpsc};

use prefd_types::log::LogEntry;
use prefd_types::prelude::*;
use prefd_types::types::{PrefType, PrefValue};
use prefd_types::wire::{Notice, Op, Reply};

use crate::conn::Connection;

/// Buffer for the local broadcast relay channel
const BROADCAST_BUFFER: usize = 128;

/// An out-of-band signal relayed through the service
#[derive(Debug, Clone)]
pub struct BroadcastMsg {
	pub action: String,
	pub payload: Value,
}

struct CacheInner {
	socket_path: Box<str>,
	conn: tokio::sync::Mutex<Option<Arc<Connection>>>,
	/// Keys this process has read at least once. `None` records a key the
	/// service had no value for, so the call is not repeated.
	local: parking_lot::RwLock<HashMap<String, Option<PrefValue>>>,
	/// One-way latches mirroring the service lifecycle
	active: AtomicBool,
	ready: AtomicBool,
	broadcasts: broadcast::Sender<BroadcastMsg>,
}

/// Caller-owned manager handle; one per process, cloned via `Arc`
pub struct PrefCache {
	inner: Arc<CacheInner>,
}

impl PrefCache {
	pub fn new(socket_path: impl Into<Box<str>>) -> Self {
		let (broadcasts, _) = broadcast::channel(BROADCAST_BUFFER);
		Self {
			inner: Arc::new(CacheInner {
				socket_path: socket_path.into(),
				conn: tokio::sync::Mutex::new(None),
				local: parking_lot::RwLock::new(HashMap::new()),
				active: AtomicBool::new(false),
				ready: AtomicBool::new(false),
				broadcasts,
			}),
		}
	}

	// ===== Binding =====

	/// Get the live connection, binding lazily on first use. Failure
	/// leaves the cache unbound; callers degrade to their defaults.
	async fn bind(&self) -> PrefResult<Arc<Connection>> {
		let mut guard = self.inner.conn.lock().await;
		if let Some(conn) = guard.as_ref() {
			return Ok(conn.clone());
		}

		debug!("Binding to settings service at {}", self.inner.socket_path);
		let (notice_tx, notice_rx) = mpsc::unbounded_channel();
		let conn = Arc::new(Connection::open(&self.inner.socket_path, notice_tx).await?);
		conn.call_unit(Op::Subscribe).await?;

		spawn_notice_pump(Arc::downgrade(&self.inner), Arc::downgrade(&conn), notice_rx);

		*guard = Some(conn.clone());
		Ok(conn)
	}

	/// Drop the connection after a failed call; the next call rebinds
	async fn invalidate(&self) {
		debug!("Service connection died, will rebind on next call");
		self.inner.conn.lock().await.take();
	}

	/// Whether the cache currently holds a live binding. Purely
	/// informational: callers that ignore it just see default values.
	pub async fn is_bound(&self) -> bool {
		self.inner.conn.lock().await.is_some()
	}

	async fn call(&self, op: Op) -> PrefResult<Reply> {
		let conn = self.bind().await?;
		match conn.call(op).await {
			Ok(reply) => Ok(reply),
			Err(e) => {
				self.invalidate().await;
				Err(e)
			}
		}
	}

	async fn call_silent(&self, op: Op) {
		if let Err(e) = self.call(op).await {
			debug!("Dropped call to the settings service: {}", e);
		}
	}

	// ===== Service state =====

	/// Whether the service is registered and callable. Latches once true.
	pub async fn is_service_active(&self) -> bool {
		if self.inner.active.load(Ordering::Relaxed) {
			return true;
		}
		if let Ok(Reply::Flag { value: true }) = self.call(Op::IsActive).await {
			self.inner.active.store(true, Ordering::Relaxed);
			return true;
		}
		false
	}

	/// Whether the service has loaded preferences. Latches once true.
	pub async fn is_service_ready(&self) -> bool {
		if self.inner.ready.load(Ordering::Relaxed) {
			return true;
		}
		if let Ok(Reply::Flag { value: true }) = self.call(Op::IsReady).await {
			self.inner.ready.store(true, Ordering::Relaxed);
			return true;
		}
		false
	}

	/// Version of the running service, 0 while unbound or not ready
	pub async fn service_version(&self) -> u32 {
		if !self.is_service_ready().await {
			return 0;
		}
		match self.call(Op::Version).await {
			Ok(Reply::Version { version }) => version,
			_ => 0,
		}
	}

	// ===== Preferences =====

	/// Read a preference through the cache. Until the service is ready
	/// this returns the default without caching anything; afterwards the
	/// first read of a key goes to the service and every later read is
	/// local. Type mismatches degrade to the default.
	pub async fn get(
		&self,
		key: &str,
		default: Option<PrefValue>,
		ptype: PrefType,
	) -> Option<PrefValue> {
		if !self.is_service_ready().await {
			return default;
		}

		let cached = self.inner.local.read().get(key).cloned();
		let resolved = match cached {
			Some(value) => value,
			None => {
				debug!("Making IPC call to collect data value with key '{}'", key);
				match self
					.call(Op::Get { key: key.to_string(), ptype, default: default.clone() })
					.await
				{
					Ok(Reply::Value { value }) => {
						self.inner.local.write().insert(key.to_string(), value.clone());
						value
					}
					_ => return default,
				}
			}
		};

		match resolved {
			Some(value) if value.matches_type(ptype) => Some(value),
			_ => default,
		}
	}

	pub async fn get_bool(&self, key: &str, default: bool) -> bool {
		match self.get(key, Some(PrefValue::Bool(default)), PrefType::Bool).await {
			Some(PrefValue::Bool(v)) => v,
			_ => default,
		}
	}

	pub async fn get_int(&self, key: &str, default: i64) -> i64 {
		match self.get(key, Some(PrefValue::Int(default)), PrefType::Int).await {
			Some(PrefValue::Int(v)) => v,
			_ => default,
		}
	}

	pub async fn get_string(&self, key: &str, default: &str) -> String {
		match self.get(key, Some(PrefValue::Str(default.to_string())), PrefType::String).await {
			Some(PrefValue::Str(v)) => v,
			_ => default.to_string(),
		}
	}

	pub async fn get_string_list(&self, key: &str, default: Vec<String>) -> Vec<String> {
		match self
			.get(key, Some(PrefValue::StrList(default.clone())), PrefType::StringList)
			.await
		{
			Some(PrefValue::StrList(v)) => v,
			_ => default,
		}
	}

	/// Store a preference. Dropped silently while unbound; the local copy
	/// is refreshed by the change notice, not by this call.
	pub async fn put(&self, key: &str, value: PrefValue, preserve: bool) {
		debug!("Making IPC call to update data value with key '{}'", key);
		self.call_silent(Op::Put { key: key.to_string(), value, preserve }).await;
	}

	pub async fn put_bool(&self, key: &str, value: bool, preserve: bool) {
		self.put(key, PrefValue::Bool(value), preserve).await;
	}

	pub async fn put_int(&self, key: &str, value: i64, preserve: bool) {
		self.put(key, PrefValue::Int(value), preserve).await;
	}

	pub async fn put_string(&self, key: &str, value: &str, preserve: bool) {
		self.put(key, PrefValue::Str(value.to_string()), preserve).await;
	}

	pub async fn put_string_list(&self, key: &str, value: Vec<String>, preserve: bool) {
		self.put(key, PrefValue::StrList(value), preserve).await;
	}

	pub async fn delete(&self, key: &str) {
		self.call_silent(Op::Delete { key: key.to_string() }).await;
	}

	/// Whether the key exists in the authoritative map, false while unbound
	pub async fn has(&self, key: &str) -> bool {
		matches!(self.call(Op::Has { key: key.to_string() }).await, Ok(Reply::Flag { value: true }))
	}

	/// Ask the service to push its map to the persistence bridge
	pub async fn save(&self) -> bool {
		matches!(self.call(Op::Save).await, Ok(Reply::Flag { value: true }))
	}

	// ===== Broadcasts =====

	/// Relay an out-of-band signal to every listener of the service
	pub async fn send_broadcast(&self, action: &str, payload: Value) {
		self.call_silent(Op::SendBroadcast { action: action.to_string(), payload }).await;
	}

	/// Subscribe to signals relayed through the service
	pub fn broadcasts(&self) -> broadcast::Receiver<BroadcastMsg> {
		self.inner.broadcasts.subscribe()
	}

	// ===== Diagnostics =====

	/// Push a log entry into the service's buffer
	pub async fn add_log_entry(&self, entry: LogEntry) {
		self.call_silent(Op::AddLogEntry { entry }).await;
	}

	/// Rendered service log, empty while unbound
	pub async fn log_entries(&self) -> Vec<String> {
		match self.call(Op::LogEntries).await {
			Ok(Reply::Log { entries }) => entries,
			_ => Vec::new(),
		}
	}

	/// Stop receiving notices without dropping the connection
	pub async fn detach(&self) {
		self.call_silent(Op::Unsubscribe).await;
	}

	#[cfg(test)]
	pub(crate) fn cached_keys(&self) -> Vec<String> {
		self.inner.local.read().keys().cloned().collect()
	}
}

/// Apply pushed notices to the local cache. Only keys this process already
/// holds are refreshed; everything else would grow the cache without bound.
fn spawn_notice_pump(
	inner: std::sync::Weak<CacheInner>,
	conn: std::sync::Weak<Connection>,
	mut notice_rx: mpsc::UnboundedReceiver<Notice>,
) {
	tokio::spawn(async move {
		while let Some(notice) = notice_rx.recv().await {
			let Some(inner) = inner.upgrade() else { break };
			match notice {
				Notice::Changed { key, ptype } => {
					if !inner.local.read().contains_key(&key) {
						continue;
					}
					let Some(conn) = conn.upgrade() else { break };
					debug!("Updating data value with key '{}'", key);
					match conn
						.call(Op::Get { key: key.clone(), ptype, default: None })
						.await
					{
						Ok(Reply::Value { value }) => {
							inner.local.write().insert(key, value);
						}
						_ => {
							debug!("Refresh of '{}' failed, dropping local copy", key);
							inner.local.write().remove(&key);
						}
					}
				}
				Notice::Removed { key } => {
					debug!("Removing data value with key '{}'", key);
					inner.local.write().remove(&key);
				}
				Notice::Broadcast { action, payload } => {
					debug!("Relaying settings broadcast with action '{}'", action);
					let _ = inner.broadcasts.send(BroadcastMsg { action, payload });
				}
			}
		}
	});
}


// vim: ts=4
