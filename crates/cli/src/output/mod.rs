//! Result envelope for every command.
//!
//! With `-f json` or `-f ndjson` each command prints one envelope on stdout:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "ok": true,
//!   "command": "submit",
//!   "data": { ... },
//!   "timings": { "durationMs": 41250 }
//! }
//! ```
//!
//! On failure `data` is replaced by
//! `"error": { "code": "HANDOFF_TIMEOUT", "message": "...", "details": { ... } }`.
//!
//! With `-f text` (the default) only the command's own text goes to stdout and
//! errors go to stderr.


use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Bumped on breaking changes to the envelope shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Plain text
	#[default]
	Text,
	/// Pretty-printed JSON envelope
	Json,
	/// Single-line JSON envelope
	Ndjson,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	pub ok: bool,

	/// `submit`, `resolve` or `conn`
	pub command: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,

	pub message: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Error classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Input rejected before the scheduler was called
	ValidationFailed,
	/// The scheduler refused or failed to queue the job
	SubmissionFailed,
	/// The job never reported back
	HandoffTimeout,
	/// Interrupted while waiting for the job
	HandoffCancelled,
	/// The job's report is missing a required field
	MalformedHandoff,
	/// The job script or the requested connection view could not be rendered
	RenderFailed,
	/// The config catalog could not be loaded
	ConfigError,
	IoError,
	/// Malformed command-line value
	InvalidInput,
	InternalError,
}

impl ErrorCode {
	pub fn as_str(self) -> &'static str {
		match self {
			ErrorCode::ValidationFailed => "VALIDATION_FAILED",
			ErrorCode::SubmissionFailed => "SUBMISSION_FAILED",
			ErrorCode::HandoffTimeout => "HANDOFF_TIMEOUT",
			ErrorCode::HandoffCancelled => "HANDOFF_CANCELLED",
			ErrorCode::MalformedHandoff => "MALFORMED_HANDOFF",
			ErrorCode::RenderFailed => "RENDER_FAILED",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		}
	}

	/// Maps a library error code string onto the envelope enum.
	pub fn from_code(code: &str) -> Self {
		match code {
			"VALIDATION_FAILED" => ErrorCode::ValidationFailed,
			"SUBMISSION_FAILED" => ErrorCode::SubmissionFailed,
			"HANDOFF_TIMEOUT" => ErrorCode::HandoffTimeout,
			"HANDOFF_CANCELLED" => ErrorCode::HandoffCancelled,
			"MALFORMED_HANDOFF" => ErrorCode::MalformedHandoff,
			"RENDER_FAILED" => ErrorCode::RenderFailed,
			"CONFIG_ERROR" => ErrorCode::ConfigError,
			"IO_ERROR" => ErrorCode::IoError,
			"INVALID_INPUT" => ErrorCode::InvalidInput,
			_ => ErrorCode::InternalError,
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
		}
	}
}

pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	/// Measures duration from `start` instead of from construction.
	pub fn started_at(mut self, start: Instant) -> Self {
		self.start_time = start;
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn command_error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok,
			command: self.command,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

/// Prints an envelope in a JSON format. Text output is command-specific and
/// handled by the caller.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let rendered = match format {
		OutputFormat::Json => serde_json::to_string_pretty(result),
		OutputFormat::Ndjson | OutputFormat::Text => serde_json::to_string(result),
	};
	if let Ok(json) = rendered {
		println!("{json}");
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
