//! Shared-filesystem handoff: the job writes `{outdir}/{job_id}.conn`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use super::cancel::CancelSignal;
use super::listener::millis;
use super::record::conn_path;
use crate::error::{Error, Result};
use crate::scheduler::JobId;

/// Waits for a job's handoff record to appear, then consumes it.
#[derive(Debug, Clone)]
pub struct PollChannel {
	path: PathBuf,
	list_parent_on_miss: bool,
}

impl PollChannel {
	pub fn new(outdir: &Path, job_id: &JobId) -> Self {
		Self {
			path: conn_path(outdir, job_id),
			list_parent_on_miss: false,
		}
	}

	/// Lists the output directory after every miss.
	///
	/// Some NFS clients cache negative lookups; a directory read forces the
	/// attribute cache to refresh. Off by default since opening the file
	/// already revalidates on close-to-open mounts.
	pub fn list_parent_on_miss(mut self, enabled: bool) -> Self {
		self.list_parent_on_miss = enabled;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Number of existence checks made for a given timeout and interval:
	/// `ceil(timeout / interval)`, and at least one.
	pub fn attempts(timeout: Duration, interval: Duration) -> u32 {
		if interval.is_zero() {
			return 1;
		}
		let n = timeout.as_nanos().div_ceil(interval.as_nanos());
		u32::try_from(n).unwrap_or(u32::MAX).max(1)
	}

	/// Checks for the record, sleeping `interval` between checks.
	///
	/// On the first hit the whole file is read and then deleted. A record that
	/// never appears yields [`Error::HandoffTimeout`] after
	/// [`attempts`](Self::attempts) checks.
	pub async fn receive(self, timeout: Duration, interval: Duration, mut cancel: CancelSignal) -> Result<String> {
		let attempts = Self::attempts(timeout, interval);
		debug!(
			target = "vnc.handoff",
			path = %self.path.display(),
			attempts,
			?interval,
			"polling for handoff record"
		);

		for attempt in 1..=attempts {
			if cancel.is_cancelled() {
				return Err(Error::HandoffCancelled { channel: "poll" });
			}
			if let Some(payload) = self.try_consume().await? {
				debug!(target = "vnc.handoff", attempt, bytes = payload.len(), "consumed handoff record");
				return Ok(payload);
			}
			trace!(target = "vnc.handoff", attempt, "handoff record not present");
			if attempt < attempts {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {}
					_ = cancel.cancelled() => return Err(Error::HandoffCancelled { channel: "poll" }),
				}
			}
		}

		warn!(target = "vnc.handoff", path = %self.path.display(), ?timeout, "handoff record never appeared");
		Err(Error::HandoffTimeout {
			channel: "poll",
			timeout_ms: millis(timeout),
		})
	}

	async fn try_consume(&self) -> Result<Option<String>> {
		let mut file = match tokio::fs::File::open(&self.path).await {
			Ok(file) => file,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				if self.list_parent_on_miss {
					self.refresh_parent().await;
				}
				return Ok(None);
			}
			Err(err) => return Err(err.into()),
		};

		let mut bytes = Vec::new();
		file.read_to_end(&mut bytes).await?;
		drop(file);
		tokio::fs::remove_file(&self.path).await?;
		Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
	}

	async fn refresh_parent(&self) {
		let Some(dir) = self.path.parent() else {
			return;
		};
		if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
			while let Ok(Some(_)) = entries.next_entry().await {}
		}
	}
}
