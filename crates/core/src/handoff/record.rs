//! Handoff records: `{outdir}/{job_id}.conn` files holding a payload.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use vnc_protocol::ConnectionInfo;

use crate::error::{Result, ValidationError};
use crate::scheduler::JobId;

/// File extension of a handoff record.
pub const RECORD_EXTENSION: &str = "conn";

/// Where the record for `job_id` lives inside `outdir`.
pub fn conn_path(outdir: &Path, job_id: &JobId) -> PathBuf {
	outdir.join(format!("{job_id}.{RECORD_EXTENSION}"))
}

/// Writes `payload` to `path`, readable by the owner only.
///
/// The payload carries a password, so an existing file is truncated and has
/// its mode reset as well.
pub fn write_private(path: &Path, payload: &str) -> Result<()> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	let mut file = options.open(path)?;

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		file.set_permissions(fs::Permissions::from_mode(0o600))?;
	}

	file.write_all(payload.as_bytes())?;
	file.flush()?;
	debug!(target = "vnc.handoff", path = %path.display(), "wrote handoff record");
	Ok(())
}

/// Reads and parses a job's handoff record without consuming it.
///
/// # Errors
///
/// [`ValidationError::InvalidPath`] when the record does not exist, and
/// [`Error::MalformedHandoff`](crate::Error::MalformedHandoff) when it fails
/// the payload contract.
pub fn read_record(outdir: &Path, job_id: &JobId) -> Result<ConnectionInfo> {
	let path = conn_path(outdir, job_id);
	if !path.is_file() {
		return Err(ValidationError::InvalidPath {
			path,
			reason: "connection file doesn't exist",
		}
		.into());
	}
	let text = fs::read_to_string(&path)?;
	Ok(ConnectionInfo::parse(&text)?)
}
