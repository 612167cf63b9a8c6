//! File-backed storage bridge.
//!
//! Persists the settings map as a JSON file. Used by the bridge daemon as
//! its durable backend, and directly by standalone deployments and tests
//! that run without a separate bridge process. Writes go through a
//! temporary file and a rename, so a crash mid-write leaves the previous
//! file intact. A write is skipped when the map on disk is already
//! identical.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use prefd::bridge::StorageBridge;
use prefd::prelude::*;
use prefd::types::PrefMap;

pub struct FsStorageBridge {
	path: PathBuf,
}

impl FsStorageBridge {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	fn tmp_path(&self) -> PathBuf {
		let mut tmp = self.path.as_os_str().to_os_string();
		tmp.push(".tmp");
		PathBuf::from(tmp)
	}

	async fn load(&self) -> PrefResult<PrefMap> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No preference file at {}, starting empty", self.path.display());
				Ok(PrefMap::default())
			}
			Err(e) => Err(e.into()),
		}
	}
}

#[async_trait]
impl StorageBridge for FsStorageBridge {
	async fn save(&self, map: &PrefMap) -> PrefResult<bool> {
		// Skip the write when durable storage already matches
		if let Ok(existing) = self.load().await {
			if existing.entries == map.entries && existing.version == map.version {
				debug!("Preference file already current, skipping write");
				return Ok(false);
			}
		}

		if let Some(parent) = self.path.parent().filter(|p| *p != Path::new("")) {
			tokio::fs::create_dir_all(parent).await?;
		}

		let json = serde_json::to_vec_pretty(map)?;
		let tmp = self.tmp_path();
		tokio::fs::write(&tmp, &json).await?;
		tokio::fs::rename(&tmp, &self.path).await?;

		info!("Wrote {} preferences to {}", map.len(), self.path.display());
		Ok(true)
	}

	async fn restore(&self) -> PrefResult<PrefMap> {
		self.load().await
	}
}

// vim: ts=4
