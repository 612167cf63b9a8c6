//! Bounded in-memory log storage.
//!
//! `LogRing` is the service's instance buffer. `BootstrapLog` covers the
//! window before the service exists: it collects entries while
//! bootstrapping and hands them over exactly once when the service goes
//! active. Each process has its own bootstrap buffer; entries logged in
//! another process before hand-off stay invisible there.

use std::collections::VecDeque;

use prefd_types::log::LogEntry;
use prefd_types::prelude::*;

pub const DEFAULT_LOG_CAPACITY: usize = 150;

/// Fraction of the capacity dropped in one pass when the buffer overflows.
/// Truncating in batches keeps append from doing O(n) work on every call.
const TRUNCATE_FRACTION: f64 = 0.15;

#[derive(Debug)]
pub struct LogRing {
	entries: VecDeque<LogEntry>,
	capacity: usize,
}

impl LogRing {
	pub fn new(capacity: usize) -> Self {
		Self { entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)), capacity }
	}

	/// Append an entry, truncating the oldest batch when the buffer would
	/// exceed its capacity.
	pub fn append(&mut self, entry: LogEntry) {
		self.entries.push_back(entry);

		if self.entries.len() > self.capacity {
			let truncate = (self.capacity as f64 * TRUNCATE_FRACTION).ceil() as usize;
			self.entries.drain(..truncate.min(self.entries.len()));
		}
	}

	/// All entries, oldest first
	pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
		self.entries.iter()
	}

	/// Rendered entries, oldest first
	pub fn rendered(&self) -> Vec<String> {
		self.entries.iter().map(LogEntry::render).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

/// Log storage for the window before the service is active.
///
/// Two states, one irreversible transition: `Bootstrapping` collects
/// entries (bounded: once full it stops accepting instead of truncating,
/// it is not meant to live long), `Attached` drops every append silently.
#[derive(Debug)]
pub enum BootstrapLog {
	Bootstrapping(LogRing),
	Attached,
}

impl BootstrapLog {
	pub fn new(capacity: usize) -> Self {
		BootstrapLog::Bootstrapping(LogRing::new(capacity))
	}

	/// Append while bootstrapping; dropped silently once attached or full
	pub fn append(&mut self, entry: LogEntry) {
		if let BootstrapLog::Bootstrapping(ring) = self {
			if ring.len() < ring.capacity() {
				ring.entries.push_back(entry);
			}
		}
	}

	/// Hand every collected entry to the service's instance buffer, in
	/// original order, and permanently disable this buffer. A second call
	/// has nothing left to move.
	pub fn attach_to(&mut self, target: &mut LogRing) {
		if let BootstrapLog::Bootstrapping(ring) = self {
			info!("Migrating {} bootstrap log entries into the service buffer", ring.len());
			for entry in ring.entries.drain(..) {
				target.append(entry);
			}
		}
		*self = BootstrapLog::Attached;
	}

	pub fn is_attached(&self) -> bool {
		matches!(self, BootstrapLog::Attached)
	}
}

impl Default for BootstrapLog {
	fn default() -> Self {
		Self::new(DEFAULT_LOG_CAPACITY)
	}
}


// vim: ts=4
