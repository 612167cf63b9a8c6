//! One live connection to the service socket.
//!
//! Requests are correlated by id and awaited on oneshot channels; notices
//! pushed by the service are forwarded to the owning manager. The reader
//! task ending (EOF or error) drops every pending waiter, which surfaces as
//! `LinkDown` at the call sites and makes the manager rebind lazily.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};

use prefd_types::prelude::*;
use prefd_types::wire::{read_frame, write_frame, Frame, Notice, Op, Reply};

/// Upper bound on a single call. The service answers from memory, so
/// anything slower than this is indistinguishable from a dead peer.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type PendingMap = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

pub(crate) struct Connection {
	out_tx: mpsc::UnboundedSender<Frame>,
	pending: PendingMap,
	next_id: AtomicU64,
}

impl Connection {
	/// Connect to the service socket and spawn the IO tasks. Notices are
	/// forwarded to `notice_tx`; its receiver ending with the connection
	/// is what stops the manager's notice pump.
	pub(crate) async fn open(
		path: &str,
		notice_tx: mpsc::UnboundedSender<Notice>,
	) -> PrefResult<Self> {
		let stream = UnixStream::connect(path).await?;
		let (rd, mut wr) = stream.into_split();

		let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
		let pending: PendingMap = Arc::new(parking_lot::Mutex::new(HashMap::new()));

		tokio::spawn(async move {
			while let Some(frame) = out_rx.recv().await {
				if let Err(e) = write_frame(&mut wr, &frame).await {
					debug!("Connection write failed: {}", e);
					break;
				}
			}
		});

		let reader_pending = pending.clone();
		tokio::spawn(async move {
			let mut reader = BufReader::new(rd);
			loop {
				match read_frame::<_, Frame>(&mut reader).await {
					Ok(Some(Frame::Res { id, reply })) => {
						if let Some(waiter) = reader_pending.lock().remove(&id) {
							let _ = waiter.send(reply);
						}
					}
					Ok(Some(Frame::Notice { notice })) => {
						if notice_tx.send(notice).is_err() {
							break;
						}
					}
					Ok(Some(Frame::Req { .. })) => {
						debug!("Ignoring request frame from the service");
					}
					Ok(None) => {
						debug!("Service connection closed");
						break;
					}
					Err(e) => {
						debug!("Service connection failed: {}", e);
						break;
					}
				}
			}
			// Dropping the waiters fails every in-flight call
			reader_pending.lock().clear();
		});

		Ok(Self { out_tx, pending, next_id: AtomicU64::new(1) })
	}

	/// Issue one call and wait for its reply
	pub(crate) async fn call(&self, op: Op) -> PrefResult<Reply> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		if self.out_tx.send(Frame::Req { id, op }).is_err() {
			self.pending.lock().remove(&id);
			return Err(Error::LinkDown);
		}

		match tokio::time::timeout(CALL_TIMEOUT, rx).await {
			Ok(Ok(reply)) => Ok(reply),
			Ok(Err(_)) => Err(Error::LinkDown),
			Err(_) => {
				self.pending.lock().remove(&id);
				Err(Error::LinkDown)
			}
		}
	}

	/// Fire a call whose reply carries no information
	pub(crate) async fn call_unit(&self, op: Op) -> PrefResult<()> {
		match self.call(op).await? {
			Reply::Unit => Ok(()),
			other => Err(Error::Protocol(format!("unexpected reply: {:?}", other))),
		}
	}
}

// vim: ts=4
