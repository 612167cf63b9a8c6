//! Shared helpers for the integration tests: a service running on a real
//! socket in a temporary directory, and a fake in-memory bridge.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use prefd::access::AccessPolicy;
use prefd::bridge::StorageBridge;
use prefd::defaults::DefaultsRegistry;
use prefd::error::{Error, PrefResult};
use prefd::logbuf::BootstrapLog;
use prefd::store::PrefStore;
use prefd::types::PrefMap;
use prefd::{sockserver, version_code};

pub fn setup_test_logging() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

/// In-memory bridge double; seed `stored` to control what restore returns
#[derive(Default)]
pub struct FakeBridge {
	pub stored: parking_lot::Mutex<Option<PrefMap>>,
	pub unavailable: bool,
}

#[async_trait]
impl StorageBridge for FakeBridge {
	async fn save(&self, map: &PrefMap) -> PrefResult<bool> {
		if self.unavailable {
			return Err(Error::BridgeUnavailable);
		}
		*self.stored.lock() = Some(map.clone());
		Ok(true)
	}

	async fn restore(&self) -> PrefResult<PrefMap> {
		if self.unavailable {
			return Err(Error::BridgeUnavailable);
		}
		Ok(self.stored.lock().clone().unwrap_or_default())
	}
}

/// A service bound to a socket in its own temporary directory. Dropping it
/// closes the socket and every open session, so from a manager's point of
/// view the service died.
pub struct TestService {
	pub store: Arc<PrefStore>,
	pub socket: String,
	_server: sockserver::ServerHandle,
	_dir: Option<tempfile::TempDir>,
}

impl TestService {
	/// Build a store (still `Created`) and serve it on a fresh socket
	pub async fn start(bridge: Arc<dyn StorageBridge>) -> Self {
		Self::start_with_defaults(bridge, DefaultsRegistry::new()).await
	}

	pub async fn start_with_defaults(
		bridge: Arc<dyn StorageBridge>,
		defaults: DefaultsRegistry,
	) -> Self {
		let dir = tempfile::tempdir().expect("tempdir");
		let socket = dir.path().join("prefd.sock").to_string_lossy().into_owned();
		Self::serve(bridge, defaults, socket, Some(dir)).await
	}

	/// Serve on a caller-owned socket path (service restart scenarios)
	pub async fn start_at(bridge: Arc<dyn StorageBridge>, socket: &str) -> Self {
		Self::serve(bridge, DefaultsRegistry::new(), socket.to_string(), None).await
	}

	async fn serve(
		bridge: Arc<dyn StorageBridge>,
		defaults: DefaultsRegistry,
		socket: String,
		dir: Option<tempfile::TempDir>,
	) -> Self {
		setup_test_logging();
		let uid = prefd::access::current_uid();
		let store = Arc::new(PrefStore::new(
			version_code(),
			defaults.freeze(),
			AccessPolicy::new(uid, uid),
			bridge,
			150,
		));

		let listener = sockserver::bind(&socket).await.expect("bind");
		let server = sockserver::spawn(store.clone(), listener);

		Self { store, socket, _server: server, _dir: dir }
	}

	/// Drive the store to `Ready`
	pub async fn go_ready(&self) {
		let mut bootstrap = BootstrapLog::default();
		self.store.on_startup(&mut bootstrap);
		self.store.on_ready().await;
	}
}

/// Poll an async condition until it holds or the deadline passes
pub async fn eventually<F, Fut>(what: &str, check: F)
where
	F: Fn() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	for _ in 0..200 {
		if check().await {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not met in time: {}", what);
}

// vim: ts=4
