//! The persistence bridge daemon's service loop.
//!
//! Runs in its own process with access to durable storage the service
//! process does not have. Only the configured store identity may call it;
//! every other peer gets a `Denied` reply and a log line. A connection
//! carries exactly one operation.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use prefd_types::bridge::StorageBridge;
use prefd_types::wire::{read_frame, write_frame, BridgeReply, BridgeRequest};

use crate::prelude::*;

pub struct BridgeService {
	backend: Arc<dyn StorageBridge>,
	/// Identity of the service process allowed to call this bridge
	allowed_uid: u32,
}

impl BridgeService {
	pub fn new(backend: Arc<dyn StorageBridge>, allowed_uid: u32) -> Self {
		Self { backend, allowed_uid }
	}

	/// Spawn the accept loop
	pub fn spawn(self: Arc<Self>, listener: UnixListener) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				match listener.accept().await {
					Ok((stream, _)) => {
						let service = self.clone();
						tokio::spawn(async move {
							service.handle(stream).await;
						});
					}
					Err(e) => {
						warn!("Accept failed on bridge socket: {}", e);
					}
				}
			}
		})
	}

	async fn handle(&self, stream: UnixStream) {
		let uid = match stream.peer_cred() {
			Ok(cred) => cred.uid(),
			Err(e) => {
				warn!("Cannot read peer credentials on bridge socket: {}", e);
				return;
			}
		};
		let (rd, mut wr) = stream.into_split();
		let mut reader = BufReader::new(rd);

		let request = match read_frame::<_, BridgeRequest>(&mut reader).await {
			Ok(Some(request)) => request,
			Ok(None) => return,
			Err(e) => {
				debug!("Bad bridge request: {}", e);
				return;
			}
		};

		if uid != self.allowed_uid {
			info!("Invalid caller '{}' tried to access preferences from outside the settings service", uid);
			let _ = write_frame(&mut wr, &BridgeReply::Denied).await;
			return;
		}

		let reply = match request {
			BridgeRequest::Write { data } => {
				info!("Writing preferences to durable storage");
				match self.backend.save(&data).await {
					Ok(changed) => BridgeReply::Written { changed },
					Err(e) => {
						error!("Preference write failed: {}", e);
						return;
					}
				}
			}
			BridgeRequest::Read => {
				info!("Reading preferences from durable storage");
				match self.backend.restore().await {
					Ok(data) => BridgeReply::Data { data },
					Err(e) => {
						error!("Preference read failed: {}", e);
						return;
					}
				}
			}
		};

		if let Err(e) = write_frame(&mut wr, &reply).await {
			debug!("Bridge reply write failed: {}", e);
		}
	}
}

// vim: ts=4
