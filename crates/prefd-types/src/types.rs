//! Core value model of the settings store.
//!
//! The store maps string keys to one of four typed values. The type tag is
//! a proper enum handled exhaustively at compile time; readers that ask for
//! the wrong type get their own default back, never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type tag for a preference value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefType {
	#[serde(rename = "string")]
	String,
	#[serde(rename = "int")]
	Int,
	#[serde(rename = "bool")]
	Bool,
	#[serde(rename = "string_list")]
	StringList,
}

/// Preference value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)] // No type tag - the four JSON shapes are disjoint
pub enum PrefValue {
	Bool(bool), // Must be before Int to avoid bool -> int coercion
	Int(i64),
	Str(String),
	StrList(Vec<String>),
}

impl PrefValue {
	/// The type tag of this value
	pub fn pref_type(&self) -> PrefType {
		match self {
			PrefValue::Str(_) => PrefType::String,
			PrefValue::Int(_) => PrefType::Int,
			PrefValue::Bool(_) => PrefType::Bool,
			PrefValue::StrList(_) => PrefType::StringList,
		}
	}

	/// Check if this value carries the requested type
	pub fn matches_type(&self, ptype: PrefType) -> bool {
		self.pref_type() == ptype
	}

	/// Get the type name for log messages
	pub fn type_name(&self) -> &'static str {
		match self {
			PrefValue::Str(_) => "string",
			PrefValue::Int(_) => "int",
			PrefValue::Bool(_) => "bool",
			PrefValue::StrList(_) => "string_list",
		}
	}
}

impl From<bool> for PrefValue {
	fn from(v: bool) -> Self {
		PrefValue::Bool(v)
	}
}

impl From<i64> for PrefValue {
	fn from(v: i64) -> Self {
		PrefValue::Int(v)
	}
}

impl From<String> for PrefValue {
	fn from(v: String) -> Self {
		PrefValue::Str(v)
	}
}

impl From<&str> for PrefValue {
	fn from(v: &str) -> Self {
		PrefValue::Str(v.to_string())
	}
}

impl From<Vec<String>> for PrefValue {
	fn from(v: Vec<String>) -> Self {
		PrefValue::StrList(v)
	}
}

/// One stored preference. The preserve flag marks an entry whose in-memory
/// value must not be clobbered by a later restore from durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefEntry {
	pub value: PrefValue,
	#[serde(default)]
	pub preserve: bool,
}

/// The settings map as it travels between the store and the bridge:
/// entries plus a version field identifying the writer.
///
/// A key appears at most once, so "same key, different type tags" cannot be
/// represented. The dirty flag tracks unsaved changes; the bridge is only
/// poked when it is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefMap {
	pub entries: HashMap<String, PrefEntry>,
	#[serde(default)]
	pub version: u32,
	#[serde(skip)]
	pub dirty: bool,
}

impl PrefMap {
	pub fn new(version: u32) -> Self {
		Self { entries: HashMap::new(), version, dirty: false }
	}

	pub fn contains(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	pub fn get(&self, key: &str) -> Option<&PrefEntry> {
		self.entries.get(key)
	}

	/// Insert or replace an entry and mark the map dirty
	pub fn put(&mut self, key: impl Into<String>, value: PrefValue, preserve: bool) {
		self.entries.insert(key.into(), PrefEntry { value, preserve });
		self.dirty = true;
	}

	/// Remove an entry. Marks the map dirty only when something was removed.
	pub fn remove(&mut self, key: &str) -> Option<PrefEntry> {
		let removed = self.entries.remove(key);
		if removed.is_some() {
			self.dirty = true;
		}
		removed
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Merge a map restored from durable storage into this one.
	///
	/// Entries flagged preserve in the current map win over their disk
	/// counterpart; everything else is taken from disk. Clears the dirty
	/// flag: after a restore the in-memory map and durable storage agree on
	/// everything the next save would transmit.
	pub fn merge_restored(&mut self, disk: PrefMap) {
		let mut merged = disk.entries;
		for (key, entry) in self.entries.drain() {
			if entry.preserve {
				merged.insert(key, entry);
			}
		}
		self.entries = merged;
		self.dirty = false;
	}

	/// Clear the dirty flag after a successful save
	pub fn mark_saved(&mut self) {
		self.dirty = false;
	}
}

/// Lifecycle state of the settings service.
///
/// Transitions are monotonic and driven only by the host lifecycle
/// callbacks: startup makes the service callable, ready means preferences
/// have been loaded through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceState {
	#[serde(rename = "created")]
	Created,
	#[serde(rename = "active")]
	Active,
	#[serde(rename = "ready")]
	Ready,
}

/// Peer credentials of a caller, as reported by the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
	pub uid: u32,
	pub gid: u32,
	pub pid: Option<i32>,
}

impl CallerIdentity {
	pub fn new(uid: u32, gid: u32) -> Self {
		Self { uid, gid, pid: None }
	}
}


// vim: ts=4
