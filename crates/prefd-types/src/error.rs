//! Error type shared across the prefd crates.
//!
//! The failure policy of the whole subsystem is "degrade, don't propagate":
//! link failures make readers fall back to defaults and writers drop the
//! write, so most of these variants never reach an application caller. They
//! exist for the plumbing layers (sessions, bridge, adapters) that need to
//! decide *how* to degrade.

use std::fmt;

pub type PrefResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// The remote side is gone or was never there. The caller is expected
	/// to drop its connection and rebind lazily on the next call.
	LinkDown,
	/// The peer sent a frame we could not make sense of.
	Protocol(String),
	/// Mutation rejected by the access policy.
	PermissionDenied,
	/// The persistence bridge could not be reached or refused the call.
	BridgeUnavailable,
	Internal(String),

	// externals
	Io(std::io::Error),
	Json(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::LinkDown => write!(f, "link down"),
			Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::BridgeUnavailable => write!(f, "persistence bridge unavailable"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(e) => write!(f, "io error: {}", e),
			Error::Json(msg) => write!(f, "json error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Json(err.to_string())
	}
}

// vim: ts=4
