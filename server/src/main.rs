//! The prefd settings service daemon.
//!
//! Configured through environment variables:
//! - `PREFD_SOCKET`: service socket path
//! - `PREFD_BRIDGE_SOCKET`: persistence bridge socket path
//! - `PREFD_SYSTEM_UID`: owning privileged identity (default 0)
//! - `PREFD_GRANT_UIDS` / `PREFD_GRANT_GIDS`: comma-separated write grants
//! - `PREFD_DEFAULTS`: optional JSON file of shipped default values

use std::env;

use prefd::types::PrefValue;

fn env_or(name: &str, fallback: &str) -> String {
	env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn env_ids(name: &str) -> Vec<u32> {
	env::var(name)
		.map(|v| v.split(',').filter_map(|p| p.trim().parse().ok()).collect())
		.unwrap_or_default()
}

#[tokio::main]
async fn main() {
	let mut builder = prefd::AppBuilder::new();
	builder
		.listen(env_or("PREFD_SOCKET", "/run/prefd/prefd.sock"))
		.bridge_socket(env_or("PREFD_BRIDGE_SOCKET", "/run/prefd/bridge.sock"))
		.system_uid(env_or("PREFD_SYSTEM_UID", "0").parse().unwrap_or(0))
		.grant_uids(env_ids("PREFD_GRANT_UIDS"))
		.grant_gids(env_ids("PREFD_GRANT_GIDS"));

	if let Ok(path) = env::var("PREFD_DEFAULTS") {
		match load_defaults(&path) {
			Ok(defaults) => {
				for (key, value) in defaults {
					builder.default_value(key, value);
				}
			}
			Err(e) => {
				eprintln!("Cannot load shipped defaults from {}: {}", path, e);
				std::process::exit(1);
			}
		}
	}

	if let Err(e) = builder.run().await {
		eprintln!("prefd failed: {}", e);
		std::process::exit(1);
	}
}

fn load_defaults(path: &str) -> Result<Vec<(String, PrefValue)>, Box<dyn std::error::Error>> {
	let bytes = std::fs::read(path)?;
	let map: std::collections::BTreeMap<String, PrefValue> = serde_json::from_slice(&bytes)?;
	Ok(map.into_iter().collect())
}

// vim: ts=4
