//! Wire protocol between managers and the settings service.
//!
//! Frames are line-delimited JSON over a Unix domain socket. Requests carry
//! a correlation id echoed by the matching response; notices are pushed by
//! the service without an id. A connection carries exactly one manager, so
//! listener identity is connection identity.
//!
//! Frame format:
//! ```json
//! {"t":"req","id":3,"op":{"t":"get","key":"ui.theme","ptype":"string","default":"dark"}}
//! {"t":"res","id":3,"reply":{"t":"value","value":"light"}}
//! {"t":"notice","notice":{"t":"changed","key":"ui.theme","ptype":"string"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::log::LogEntry;
use crate::prelude::*;
use crate::types::{PrefType, PrefValue};

/// Operations a manager can invoke on the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Op {
	Version,
	IsActive,
	IsReady,
	Has { key: String },
	Get { key: String, ptype: PrefType, default: Option<PrefValue> },
	Put { key: String, value: PrefValue, preserve: bool },
	Delete { key: String },
	Save,
	Subscribe,
	Unsubscribe,
	SendBroadcast { action: String, payload: Value },
	AddLogEntry { entry: LogEntry },
	LogEntries,
}

/// Response payloads, one shape per operation family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Reply {
	Version { version: u32 },
	Flag { value: bool },
	Value { value: Option<PrefValue> },
	Unit,
	Log { entries: Vec<String> },
}

/// Push notifications from the store to its listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Notice {
	Changed { key: String, ptype: PrefType },
	Removed { key: String },
	Broadcast { action: String, payload: Value },
}

/// Top-level frame on the manager connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Frame {
	Req { id: u64, op: Op },
	Res { id: u64, reply: Reply },
	Notice { notice: Notice },
}

/// Requests on the short-lived bridge connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum BridgeRequest {
	Write { data: crate::types::PrefMap },
	Read,
}

/// Replies on the bridge connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum BridgeReply {
	Written { changed: bool },
	Data { data: crate::types::PrefMap },
	Denied,
}

/// Write one frame as a JSON line
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> PrefResult<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let mut line = serde_json::to_vec(frame)?;
	line.push(b'\n');
	writer.write_all(&line).await?;
	writer.flush().await?;
	Ok(())
}

/// Read the next frame from a buffered reader.
///
/// Returns `Ok(None)` on a clean EOF (peer closed the connection). A frame
/// that fails to parse is a protocol error, not an EOF.
pub async fn read_frame<R, T>(reader: &mut BufReader<R>) -> PrefResult<Option<T>>
where
	R: tokio::io::AsyncRead + Unpin,
	T: serde::de::DeserializeOwned,
{
	let mut line = String::new();
	let n = reader.read_line(&mut line).await?;
	if n == 0 {
		return Ok(None);
	}
	let frame = serde_json::from_str(line.trim_end())
		.map_err(|e| Error::Protocol(format!("bad frame: {}", e)))?;
	Ok(Some(frame))
}


// vim: ts=4
