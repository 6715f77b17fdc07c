//! Error types for session submission and handoff.

use std::path::PathBuf;

use thiserror::Error;
use vnc_protocol::{Field, FormatError, PayloadError};

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Input rejected before any external call is made.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A path that must exist (or must not be a plain file) is wrong.
	#[error("invalid path {}: {reason}", path.display())]
	InvalidPath { path: PathBuf, reason: &'static str },

	/// The requested cluster is not one the catalog knows.
	#[error("invalid cluster '{0}'")]
	InvalidCluster(String),

	/// Walltime does not match `DD:DD:DD`.
	#[error("invalid walltime '{0}' (expected HH:MM:SS)")]
	InvalidWalltime(String),

	/// Batch id missing from the config catalog.
	#[error("unknown batch type '{0}'")]
	UnknownBatchType(String),

	/// Cluster id missing from the config catalog.
	#[error("unknown cluster '{0}'")]
	UnknownCluster(String),
}

/// Errors that can occur while launching a session.
///
/// Every variant is terminal for the submit call that produced it; nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	/// The scheduler call failed or rejected the job.
	#[error("job submission failed: {0:#}")]
	Submission(#[source] anyhow::Error),

	/// The job was accepted but no payload arrived in time.
	#[error("timed out after {timeout_ms}ms waiting for {channel} handoff")]
	HandoffTimeout { channel: &'static str, timeout_ms: u64 },

	/// The caller abandoned the wait before the timeout.
	#[error("{channel} handoff wait cancelled")]
	HandoffCancelled { channel: &'static str },

	/// A payload arrived but failed the required-field contract.
	#[error("malformed handoff: {source}")]
	MalformedHandoff {
		field: Field,
		#[source]
		source: PayloadError,
	},

	/// The peer kept sending past the payload size limit.
	#[error("{channel} handoff payload exceeds {limit_bytes} bytes")]
	OversizedHandoff { channel: &'static str, limit_bytes: u64 },

	/// The templating collaborator could not produce a script.
	#[error("template render failed: {0}")]
	Render(String),

	/// A received connection cannot be shown in the requested format.
	#[error(transparent)]
	Format(#[from] FormatError),

	/// The config catalog could not be loaded.
	#[error("config error: {0}")]
	Config(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl From<PayloadError> for Error {
	fn from(source: PayloadError) -> Self {
		Error::MalformedHandoff {
			field: source.field(),
			source,
		}
	}
}

impl Error {
	/// Stable machine-readable code for this error class.
	pub fn code(&self) -> &'static str {
		match self {
			Error::Validation(_) => "VALIDATION_FAILED",
			Error::Submission(_) => "SUBMISSION_FAILED",
			Error::HandoffTimeout { .. } => "HANDOFF_TIMEOUT",
			Error::HandoffCancelled { .. } => "HANDOFF_CANCELLED",
			Error::MalformedHandoff { .. } | Error::OversizedHandoff { .. } => "MALFORMED_HANDOFF",
			Error::Render(_) | Error::Format(_) => "RENDER_FAILED",
			Error::Config(_) => "CONFIG_ERROR",
			Error::Io(_) => "IO_ERROR",
		}
	}

	/// Returns the validation failure, if this is one.
	pub fn as_validation(&self) -> Option<&ValidationError> {
		match self {
			Error::Validation(err) => Some(err),
			_ => None,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::HandoffTimeout { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn payload_error_keeps_field() {
		let err: Error = PayloadError::Missing(Field::Display).into();
		match &err {
			Error::MalformedHandoff { field, .. } => assert_eq!(*field, Field::Display),
			other => panic!("unexpected error: {other:?}"),
		}
		assert_eq!(err.code(), "MALFORMED_HANDOFF");
		assert_eq!(err.to_string(), "malformed handoff: Display not specified by batch job");
	}

	#[test]
	fn submission_message_includes_source_chain() {
		let source = anyhow::anyhow!("qsub: Unauthorized Request").context("qsub exited with status 159");
		let err = Error::Submission(source);
		assert_eq!(
			err.to_string(),
			"job submission failed: qsub exited with status 159: qsub: Unauthorized Request"
		);
	}
}
