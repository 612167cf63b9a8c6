//! Mutation authorization.
//!
//! Everyone may read; writes are allowed for the owning system identity,
//! the service's own identity, and explicitly granted uids/gids. A denied
//! write is a silent no-op at the store level, so the policy itself only
//! answers yes or no.

use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;

use prefd_types::prelude::*;
use prefd_types::types::CallerIdentity;

#[derive(Debug, Clone)]
pub struct AccessPolicy {
	/// The owning privileged identity (root by default)
	system_uid: u32,
	/// The identity the service itself runs as
	service_uid: u32,
	/// Additional identities granted write access
	grant_uids: HashSet<u32>,
	/// Groups granted write access (the "named permission" of the policy)
	grant_gids: HashSet<u32>,
}

impl AccessPolicy {
	pub fn new(system_uid: u32, service_uid: u32) -> Self {
		Self { system_uid, service_uid, grant_uids: HashSet::new(), grant_gids: HashSet::new() }
	}

	/// Policy for the current process, with root as the owning identity
	pub fn for_current_process() -> Self {
		Self::new(0, current_uid())
	}

	pub fn grant_uid(mut self, uid: u32) -> Self {
		self.grant_uids.insert(uid);
		self
	}

	pub fn grant_gid(mut self, gid: u32) -> Self {
		self.grant_gids.insert(gid);
		self
	}

	/// Check whether the caller may mutate the store
	pub fn authorize(&self, caller: &CallerIdentity) -> bool {
		caller.uid == self.system_uid
			|| caller.uid == self.service_uid
			|| self.grant_uids.contains(&caller.uid)
			|| self.grant_gids.contains(&caller.gid)
	}
}

/// Uid of the current process, read from procfs. Avoids a libc binding;
/// the service only runs on Linux.
pub fn current_uid() -> u32 {
	match std::fs::metadata("/proc/self") {
		Ok(meta) => meta.uid(),
		Err(e) => {
			warn!("Cannot read own uid from /proc/self: {}", e);
			0
		}
	}
}


// vim: ts=4
