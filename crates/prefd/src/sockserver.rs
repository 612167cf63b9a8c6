//! Unix socket server for the manager-facing RPC surface.
//!
//! Every accepted connection is one manager session: requests are answered
//! in order, and a `Subscribe` turns the connection into a listener by
//! registering its push channel. The connection closing is the listener's
//! death notification; the session removes it from the registry on the way
//! out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use prefd_core::registry::{ListenerHandle, ListenerId};
use prefd_core::store::PrefStore;
use prefd_types::types::CallerIdentity;
use prefd_types::wire::{read_frame, write_frame, Frame, Op, Reply};

use crate::prelude::*;

/// Connection ids double as listener identities; uniqueness within the
/// process lifetime is all they need.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Running socket server. Shutting it down (or dropping it) stops the
/// accept loop and closes every open session, which is what managers
/// observe as the service dying.
pub struct ServerHandle {
	accept: JoinHandle<()>,
	cancel: watch::Sender<bool>,
}

impl ServerHandle {
	pub fn shutdown(&self) {
		let _ = self.cancel.send(true);
		self.accept.abort();
	}
}

impl Drop for ServerHandle {
	fn drop(&mut self) {
		self.shutdown();
	}
}

/// Bind the service socket, replacing a stale socket file from a previous
/// run
pub async fn bind(path: &str) -> PrefResult<UnixListener> {
	if let Some(parent) = std::path::Path::new(path).parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let _ = tokio::fs::remove_file(path).await;
	Ok(UnixListener::bind(path)?)
}

/// Spawn the accept loop
pub fn spawn(store: Arc<PrefStore>, listener: UnixListener) -> ServerHandle {
	let (cancel, cancel_rx) = watch::channel(false);
	let accept = tokio::spawn(async move {
		loop {
			match listener.accept().await {
				Ok((stream, _)) => {
					let store = store.clone();
					let cancel_rx = cancel_rx.clone();
					tokio::spawn(async move {
						handle_session(store, stream, cancel_rx).await;
					});
				}
				Err(e) => {
					warn!("Accept failed on service socket: {}", e);
				}
			}
		}
	});
	ServerHandle { accept, cancel }
}

async fn handle_session(
	store: Arc<PrefStore>,
	stream: UnixStream,
	mut cancel: watch::Receiver<bool>,
) {
	let caller = match stream.peer_cred() {
		Ok(cred) => CallerIdentity { uid: cred.uid(), gid: cred.gid(), pid: cred.pid() },
		Err(e) => {
			warn!("Cannot read peer credentials, dropping connection: {}", e);
			return;
		}
	};
	let id = ListenerId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
	debug!("Manager session {:?} opened by uid {}", id, caller.uid);

	let (rd, mut wr) = stream.into_split();
	let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();

	let writer = tokio::spawn(async move {
		while let Some(frame) = out_rx.recv().await {
			if let Err(e) = write_frame(&mut wr, &frame).await {
				debug!("Session write failed: {}", e);
				break;
			}
		}
	});

	let mut reader = BufReader::new(rd);
	let mut subscribed = false;
	loop {
		tokio::select! {
			frame = read_frame::<_, Frame>(&mut reader) => match frame {
				Ok(Some(Frame::Req { id: req_id, op })) => {
					let reply = dispatch(&store, &caller, id, &out_tx, &mut subscribed, op).await;
					if out_tx.send(Frame::Res { id: req_id, reply }).is_err() {
						break;
					}
				}
				Ok(Some(_)) => {
					debug!("Ignoring non-request frame from manager session {:?}", id);
				}
				Ok(None) => break,
				Err(e) => {
					debug!("Manager session {:?} failed: {}", id, e);
					break;
				}
			},
			_ = cancel.changed() => break,
		}
	}

	// Death path: the connection is gone, so the listener is too
	store.registry().remove(id);
	drop(out_tx);
	let _ = writer.await;
	debug!("Manager session {:?} closed", id);
}

async fn dispatch(
	store: &Arc<PrefStore>,
	caller: &CallerIdentity,
	id: ListenerId,
	out_tx: &mpsc::UnboundedSender<Frame>,
	subscribed: &mut bool,
	op: Op,
) -> Reply {
	match op {
		Op::Version => Reply::Version { version: store.version() },
		Op::IsActive => Reply::Flag { value: store.is_active() },
		Op::IsReady => Reply::Flag { value: store.is_ready() },
		Op::Has { key } => Reply::Flag { value: store.has(&key) },
		Op::Get { key, ptype, default } => {
			Reply::Value { value: store.get(&key, default, ptype) }
		}
		Op::Put { key, value, preserve } => {
			store.put(caller, &key, value, preserve);
			Reply::Unit
		}
		Op::Delete { key } => {
			store.delete(caller, &key);
			Reply::Unit
		}
		Op::Save => Reply::Flag { value: store.save(caller).await },
		Op::Subscribe => {
			if !*subscribed {
				let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
				store.registry().add(ListenerHandle::new(id, notice_tx));
				*subscribed = true;

				let out_tx = out_tx.clone();
				tokio::spawn(async move {
					while let Some(notice) = notice_rx.recv().await {
						if out_tx.send(Frame::Notice { notice }).is_err() {
							break;
						}
					}
				});
			}
			Reply::Unit
		}
		Op::Unsubscribe => {
			store.registry().remove(id);
			*subscribed = false;
			Reply::Unit
		}
		Op::SendBroadcast { action, payload } => {
			store.send_broadcast(&action, payload);
			Reply::Unit
		}
		Op::AddLogEntry { entry } => {
			store.add_log_entry(entry);
			Reply::Unit
		}
		Op::LogEntries => Reply::Log { entries: store.log_entries() },
	}
}

// vim: ts=4
