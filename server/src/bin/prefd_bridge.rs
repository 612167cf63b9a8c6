//! The prefd persistence bridge daemon.
//!
//! Runs under a different identity than the settings service and owns the
//! durable preference file. Only the configured store identity may call
//! it.
//!
//! Environment variables:
//! - `PREFD_BRIDGE_SOCKET`: socket path to serve on
//! - `PREFD_DATA_FILE`: durable preference file
//! - `PREFD_STORE_UID`: uid of the settings service (default 0)

use std::env;
use std::sync::Arc;

use prefd::bridge_service::BridgeService;
use prefd_bridge_adapter_fs::FsStorageBridge;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let socket = env::var("PREFD_BRIDGE_SOCKET")
		.unwrap_or_else(|_| "/run/prefd/bridge.sock".to_string());
	let data_file = env::var("PREFD_DATA_FILE")
		.unwrap_or_else(|_| "./data/preferences.json".to_string());
	let store_uid = env::var("PREFD_STORE_UID").ok().and_then(|v| v.parse().ok()).unwrap_or(0);

	let listener = match prefd::sockserver::bind(&socket).await {
		Ok(listener) => listener,
		Err(e) => {
			eprintln!("Cannot bind bridge socket {}: {}", socket, e);
			std::process::exit(1);
		}
	};
	tracing::info!("Preference bridge listening on {} (store uid {})", socket, store_uid);

	let service =
		Arc::new(BridgeService::new(Arc::new(FsStorageBridge::new(data_file)), store_uid));
	let accept = service.spawn(listener);

	if let Err(e) = tokio::signal::ctrl_c().await {
		eprintln!("Signal handling failed: {}", e);
	}
	accept.abort();
}

// vim: ts=4
