use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Session(#[from] vnc::Error),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl CliError {
	/// Converts this error to the envelope's error object.
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::Session(err) => (ErrorCode::from_code(err.code()), session_details(err)),
			CliError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

fn session_details(err: &vnc::Error) -> Option<serde_json::Value> {
	match err {
		vnc::Error::Validation(vnc::ValidationError::InvalidPath { path, reason }) => {
			Some(serde_json::json!({ "path": path, "reason": reason }))
		}
		vnc::Error::HandoffTimeout { channel, timeout_ms } => {
			Some(serde_json::json!({ "channel": channel, "timeoutMs": timeout_ms }))
		}
		vnc::Error::HandoffCancelled { channel } => Some(serde_json::json!({ "channel": channel })),
		vnc::Error::MalformedHandoff { field, .. } => Some(serde_json::json!({ "field": field.label() })),
		vnc::Error::OversizedHandoff { channel, limit_bytes } => {
			Some(serde_json::json!({ "channel": channel, "limitBytes": limit_bytes }))
		}
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_errors_keep_their_code() {
		let err = CliError::from(vnc::Error::HandoffTimeout {
			channel: "poll",
			timeout_ms: 120_000,
		});
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::HandoffTimeout);
		assert_eq!(cmd.details.unwrap()["timeoutMs"], 120_000);
	}

	#[test]
	fn validation_errors_carry_the_path() {
		let err = CliError::from(vnc::Error::from(vnc::ValidationError::InvalidPath {
			path: "/nope/xstartup".into(),
			reason: "xstartup script is not found",
		}));
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::ValidationFailed);
		assert_eq!(cmd.details.unwrap()["path"], "/nope/xstartup");
		assert!(cmd.message.contains("xstartup script is not found"));
	}

	#[test]
	fn malformed_handoff_names_the_field() {
		let err = CliError::from(vnc::Error::from(vnc::PayloadError::Missing(vnc::Field::Port)));
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::MalformedHandoff);
		assert_eq!(cmd.details.unwrap()["field"], "Port");
	}

	#[test]
	fn oversized_handoff_reports_the_limit() {
		let err = CliError::from(vnc::Error::OversizedHandoff {
			channel: "listener",
			limit_bytes: 65_536,
		});
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::MalformedHandoff);
		assert_eq!(cmd.details.unwrap()["limitBytes"], 65_536);
	}
}
