//! Basic save/restore behavior of the file-backed bridge

use std::sync::Arc;

use prefd::bridge::StorageBridge;
use prefd::types::{PrefMap, PrefValue};
use prefd_bridge_adapter_fs::FsStorageBridge;

fn sample_map() -> PrefMap {
	let mut map = PrefMap::new(3);
	map.put("ui.theme", PrefValue::Str("dark".into()), false);
	map.put("net.retries", PrefValue::Int(4), true);
	map.put("features", PrefValue::StrList(vec!["a".into(), "b".into()]), false);
	map
}

#[tokio::test]
async fn test_missing_file_restores_empty_map() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = FsStorageBridge::new(dir.path().join("prefs.json"));

	let restored = bridge.restore().await.expect("restore");
	assert!(restored.is_empty());
	assert_eq!(restored.version, 0);
}

#[tokio::test]
async fn test_save_then_restore_roundtrip() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = FsStorageBridge::new(dir.path().join("prefs.json"));

	let map = sample_map();
	assert!(bridge.save(&map).await.expect("save"));

	let restored = bridge.restore().await.expect("restore");
	assert_eq!(restored.entries, map.entries);
	assert_eq!(restored.version, 3);

	// The preserve flag travels with the entry
	assert!(restored.get("net.retries").is_some_and(|e| e.preserve));
	assert!(restored.get("ui.theme").is_some_and(|e| !e.preserve));
}

#[tokio::test]
async fn test_unchanged_map_skips_write() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = FsStorageBridge::new(dir.path().join("prefs.json"));

	let map = sample_map();
	assert!(bridge.save(&map).await.expect("save"));
	assert!(!bridge.save(&map).await.expect("save again"));

	let mut changed = map.clone();
	changed.put("ui.theme", PrefValue::Str("light".into()), false);
	assert!(bridge.save(&changed).await.expect("save changed"));
}

#[tokio::test]
async fn test_save_creates_parent_directories() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = FsStorageBridge::new(dir.path().join("nested/deeper/prefs.json"));

	assert!(bridge.save(&sample_map()).await.expect("save"));
	assert_eq!(bridge.restore().await.expect("restore").len(), 3);
}

#[tokio::test]
async fn test_overwrite_replaces_previous_content() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = FsStorageBridge::new(dir.path().join("prefs.json"));

	bridge.save(&sample_map()).await.expect("save");

	let mut second = PrefMap::new(4);
	second.put("only", PrefValue::Bool(true), false);
	bridge.save(&second).await.expect("save second");

	let restored = bridge.restore().await.expect("restore");
	assert_eq!(restored.len(), 1);
	assert!(restored.contains("only"));
}

#[tokio::test]
async fn test_concurrent_readers_see_consistent_file() {
	let dir = tempfile::tempdir().expect("tempdir");
	let bridge = Arc::new(FsStorageBridge::new(dir.path().join("prefs.json")));
	bridge.save(&sample_map()).await.expect("save");

	let mut tasks = Vec::new();
	for _ in 0..8 {
		let bridge = bridge.clone();
		tasks.push(tokio::spawn(async move {
			bridge.restore().await.expect("restore").len()
		}));
	}
	for task in tasks {
		assert_eq!(task.await.expect("join"), 3);
	}
}

// vim: ts=4
