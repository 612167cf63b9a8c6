//! Shipped default values.
//!
//! Keys absent from the dynamic store fall back to a static table of
//! defaults registered at startup, so values shipped with an application
//! can live outside the store. The table is built mutable during
//! initialization and frozen before the service starts serving.

use std::collections::HashMap;

use prefd_types::prelude::*;
use prefd_types::types::{PrefType, PrefValue};

/// Mutable registry used during service initialization
#[derive(Default)]
pub struct DefaultsRegistry {
	values: HashMap<String, PrefValue>,
}

impl DefaultsRegistry {
	pub fn new() -> Self {
		Self { values: HashMap::new() }
	}

	/// Register a shipped default
	pub fn register(&mut self, key: impl Into<String>, value: PrefValue) -> PrefResult<()> {
		let key = key.into();
		if self.values.contains_key(&key) {
			return Err(Error::Internal(format!("Default '{}' is already registered", key)));
		}

		debug!("Registering shipped default: {}", key);
		self.values.insert(key, value);
		Ok(())
	}

	/// Freeze the registry (make it immutable)
	pub fn freeze(self) -> FrozenDefaults {
		info!("Freezing defaults table with {} entries", self.values.len());
		FrozenDefaults { values: self.values }
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Immutable defaults table held by the store
#[derive(Debug, Default)]
pub struct FrozenDefaults {
	values: HashMap<String, PrefValue>,
}

impl FrozenDefaults {
	/// Look up a shipped default by key and requested type. A default of
	/// the wrong type is treated as absent.
	pub fn get(&self, key: &str, ptype: PrefType) -> Option<&PrefValue> {
		self.values.get(key).filter(|v| v.matches_type(ptype))
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}


// vim: ts=4
