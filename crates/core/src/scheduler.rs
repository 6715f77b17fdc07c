//! The batch scheduler collaborator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde::Serialize;

/// Opaque identifier the scheduler assigns to an accepted job.
///
/// Trimmed of surrounding whitespace, never empty, and free of path
/// separators so it can name a file inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
	pub fn new(raw: impl AsRef<str>) -> anyhow::Result<Self> {
		let id = raw.as_ref().trim();
		if id.is_empty() {
			bail!("scheduler returned an empty job id");
		}
		if id.contains('/') || id.contains('\0') || id == "." || id == ".." {
			bail!("scheduler returned an unusable job id {id:?}");
		}
		Ok(Self(id.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for JobId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// Accepts a job script and returns the id the job was queued under.
///
/// Implementations report failures as [`anyhow::Error`]; the submitter wraps
/// them as [`Error::Submission`](crate::Error::Submission). Submission is
/// attempted once per session and never retried.
#[async_trait]
pub trait Scheduler: Send + Sync {
	async fn submit(
		&self,
		script: &str,
		headers: &BTreeMap<String, String>,
		resources: &BTreeMap<String, String>,
		envvars: &BTreeMap<String, String>,
	) -> anyhow::Result<JobId>;
}

#[async_trait]
impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
	async fn submit(
		&self,
		script: &str,
		headers: &BTreeMap<String, String>,
		resources: &BTreeMap<String, String>,
		envvars: &BTreeMap<String, String>,
	) -> anyhow::Result<JobId> {
		(**self).submit(script, headers, resources, envvars).await
	}
}
