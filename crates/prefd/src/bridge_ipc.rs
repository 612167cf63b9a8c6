//! IPC client for the persistence bridge daemon.
//!
//! Durable storage lives in a separate, differently-privileged process.
//! Each operation is its own short-lived connection: connect, send one
//! request, read one reply, disconnect. An unreachable bridge is an error
//! the store degrades on; it is never retried here.

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::UnixStream;

use prefd_types::bridge::StorageBridge;
use prefd_types::types::PrefMap;
use prefd_types::wire::{read_frame, write_frame, BridgeReply, BridgeRequest};

use crate::prelude::*;

pub struct IpcStorageBridge {
	socket_path: Box<str>,
}

impl IpcStorageBridge {
	pub fn new(socket_path: impl Into<Box<str>>) -> Self {
		Self { socket_path: socket_path.into() }
	}

	async fn poke(&self, request: BridgeRequest) -> PrefResult<BridgeReply> {
		let stream = UnixStream::connect(self.socket_path.as_ref()).await.map_err(|e| {
			debug!("Cannot reach the preference bridge at {}: {}", self.socket_path, e);
			Error::BridgeUnavailable
		})?;
		let (rd, mut wr) = stream.into_split();

		write_frame(&mut wr, &request).await?;

		let mut reader = BufReader::new(rd);
		match read_frame::<_, BridgeReply>(&mut reader).await? {
			Some(BridgeReply::Denied) => {
				warn!("Preference bridge rejected this caller");
				Err(Error::PermissionDenied)
			}
			Some(reply) => Ok(reply),
			None => Err(Error::BridgeUnavailable),
		}
	}
}

#[async_trait]
impl StorageBridge for IpcStorageBridge {
	async fn save(&self, map: &PrefMap) -> PrefResult<bool> {
		debug!("Poking the preference bridge with a save");
		match self.poke(BridgeRequest::Write { data: map.clone() }).await? {
			BridgeReply::Written { changed } => Ok(changed),
			other => Err(Error::Protocol(format!("unexpected bridge reply: {:?}", other))),
		}
	}

	async fn restore(&self) -> PrefResult<PrefMap> {
		debug!("Poking the preference bridge with a restore");
		match self.poke(BridgeRequest::Read).await? {
			BridgeReply::Data { data } => Ok(data),
			other => Err(Error::Protocol(format!("unexpected bridge reply: {:?}", other))),
		}
	}
}

// vim: ts=4
