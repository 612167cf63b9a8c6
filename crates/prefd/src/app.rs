//! App builder - constructs and runs the settings service

use std::sync::Arc;

use prefd_core::access::AccessPolicy;
use prefd_core::defaults::DefaultsRegistry;
use prefd_core::logbuf::{BootstrapLog, DEFAULT_LOG_CAPACITY};
use prefd_core::store::PrefStore;
use prefd_types::bridge::StorageBridge;
use prefd_types::types::PrefValue;

use crate::bridge_ipc::IpcStorageBridge;
use crate::prelude::*;
use crate::sockserver;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate version packed into one number, so managers can detect a version
/// skew between themselves and a service that kept running across an
/// upgrade.
pub fn version_code() -> u32 {
	let mut parts = VERSION.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
	let major = parts.next().unwrap_or(0);
	let minor = parts.next().unwrap_or(0);
	let patch = parts.next().unwrap_or(0);
	major * 1_000_000 + minor * 1_000 + patch
}

pub struct AppBuilderOpts {
	/// Path of the service socket managers connect to
	pub listen: Box<str>,
	/// Path of the persistence bridge socket
	pub bridge_socket: Box<str>,
	/// The owning privileged identity
	pub system_uid: u32,
	pub grant_uids: Box<[u32]>,
	pub grant_gids: Box<[u32]>,
	pub log_capacity: usize,
}

pub struct AppState {
	pub store: Arc<PrefStore>,
	pub opts: AppBuilderOpts,
}

pub type App = Arc<AppState>;

pub struct AppBuilder {
	opts: AppBuilderOpts,
	defaults: DefaultsRegistry,
	bridge: Option<Arc<dyn StorageBridge>>,
	bootstrap_log: BootstrapLog,
}

impl AppBuilder {
	pub fn new() -> Self {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.init();
		AppBuilder {
			opts: AppBuilderOpts {
				listen: "/run/prefd/prefd.sock".into(),
				bridge_socket: "/run/prefd/bridge.sock".into(),
				system_uid: 0,
				grant_uids: Box::new([]),
				grant_gids: Box::new([]),
				log_capacity: DEFAULT_LOG_CAPACITY,
			},
			defaults: DefaultsRegistry::new(),
			bridge: None,
			bootstrap_log: BootstrapLog::default(),
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}
	pub fn bridge_socket(&mut self, path: impl Into<Box<str>>) -> &mut Self {
		self.opts.bridge_socket = path.into();
		self
	}
	pub fn system_uid(&mut self, uid: u32) -> &mut Self {
		self.opts.system_uid = uid;
		self
	}
	pub fn grant_uids(&mut self, uids: impl IntoIterator<Item = u32>) -> &mut Self {
		self.opts.grant_uids = uids.into_iter().collect();
		self
	}
	pub fn grant_gids(&mut self, gids: impl IntoIterator<Item = u32>) -> &mut Self {
		self.opts.grant_gids = gids.into_iter().collect();
		self
	}
	pub fn log_capacity(&mut self, capacity: usize) -> &mut Self {
		self.opts.log_capacity = capacity;
		self
	}

	/// Register a shipped default for keys absent from the dynamic store
	pub fn default_value(&mut self, key: impl Into<String>, value: PrefValue) -> &mut Self {
		if let Err(e) = self.defaults.register(key, value) {
			error!("Cannot register shipped default: {}", e);
		}
		self
	}

	/// Replace the IPC bridge with another storage backend (standalone
	/// deployments, tests)
	pub fn storage_bridge(&mut self, bridge: Arc<dyn StorageBridge>) -> &mut Self {
		self.bridge = Some(bridge);
		self
	}

	/// Hand over the log buffer that collected entries before this service
	/// was built
	pub fn bootstrap_log(&mut self, log: BootstrapLog) -> &mut Self {
		self.bootstrap_log = log;
		self
	}

	/// Build the store and run the full service lifecycle: startup (bind
	/// the socket, go active), ready (restore preferences), serve until
	/// interrupted, then save and exit.
	pub async fn run(self) -> PrefResult<()> {
		info!("prefd settings service v{}", VERSION);

		let AppBuilder { opts, defaults, bridge, mut bootstrap_log } = self;

		let bridge = bridge
			.unwrap_or_else(|| Arc::new(IpcStorageBridge::new(opts.bridge_socket.clone())));

		let policy = {
			let mut policy =
				AccessPolicy::new(opts.system_uid, prefd_core::access::current_uid());
			for uid in &opts.grant_uids {
				policy = policy.grant_uid(*uid);
			}
			for gid in &opts.grant_gids {
				policy = policy.grant_gid(*gid);
			}
			policy
		};

		let store = Arc::new(PrefStore::new(
			version_code(),
			defaults.freeze(),
			policy,
			bridge,
			opts.log_capacity,
		));

		// Startup: bind first so the service is callable the moment it
		// reports active
		let listener = sockserver::bind(&opts.listen).await.map_err(|e| {
			error!("FATAL: Cannot bind service socket {}: {}", opts.listen, e);
			e
		})?;
		store.on_startup(&mut bootstrap_log);
		let server = sockserver::spawn(store.clone(), listener);
		info!("Listening on {}", opts.listen);

		// Ready: restore preferences through the bridge
		store.on_ready().await;

		// Serve until the host tells us to stop
		tokio::signal::ctrl_c().await?;

		// Shutdown: push pending changes before the process exits
		store.on_shutdown().await;
		server.shutdown();

		Ok(())
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_code_packs_semver() {
		// 0.3.2 -> 3002; whatever the current version is, the packing must
		// be monotonic in each component
		let code = version_code();
		assert_eq!(code % 1_000, VERSION.split('.').nth(2).and_then(|p| p.parse().ok()).unwrap_or(0));
	}
}

// vim: ts=4
