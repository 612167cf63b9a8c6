//! Diagnostic log entries collected by the service.
//!
//! These are for display only; nothing in the subsystem makes decisions
//! based on them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
	#[serde(rename = "debug")]
	Debug,
	#[serde(rename = "info")]
	Info,
	#[serde(rename = "error")]
	Error,
}

impl LogLevel {
	/// Single-letter marker used in the rendered block
	pub fn marker(&self) -> &'static str {
		match self {
			LogLevel::Debug => "D",
			LogLevel::Info => "I",
			LogLevel::Error => "E",
		}
	}
}

/// One captured log line, rendered for display as a multi-line block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	pub level: LogLevel,
	pub tag: String,
	pub message: String,
}

impl LogEntry {
	pub fn new(level: LogLevel, tag: impl Into<String>, message: impl Into<String>) -> Self {
		Self { level, tag: tag.into(), message: message.into() }
	}

	/// Render as a display block: marker and tag on the first line, the
	/// message indented below it with embedded newlines indented one step
	/// further.
	pub fn render(&self) -> String {
		format!("{}/{}\n\t{}\n", self.level.marker(), self.tag, self.message.replace('\n', "\n\t\t"))
	}
}


// vim: ts=4
