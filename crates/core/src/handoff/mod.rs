//! Getting connection parameters from a running job back to the submitter.
//!
//! Two channels exist, chosen per session from the resolved context:
//!
//! - [`ListenerChannel`] - the job connects to a TCP port opened before
//!   submission and writes its payload.
//! - [`PollChannel`] - the job writes `{outdir}/{job_id}.conn` on a shared
//!   filesystem and the submitter polls for it.
//!
//! Both deliver the same line payload, parsed by
//! [`ConnectionInfo::parse`](vnc_protocol::ConnectionInfo::parse).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod cancel;
mod listener;
mod poll;
mod record;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use listener::{LISTEN_HOST_VAR, LISTEN_PORT_VAR, ListenerChannel, MAX_PAYLOAD_BYTES, local_hostname};
pub use poll::PollChannel;
pub use record::{RECORD_EXTENSION, conn_path, read_record, write_private};

use crate::error::Result;

/// Default wait for a phone-home connection.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(30);
/// Default wait for a handoff record.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);
/// Default pause between handoff record checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which channel a session used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
	Listener,
	Poll,
}

impl HandoffMode {
	pub fn as_str(self) -> &'static str {
		match self {
			HandoffMode::Listener => "listener",
			HandoffMode::Poll => "poll",
		}
	}
}

impl fmt::Display for HandoffMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Timeouts and knobs for both channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSettings {
	pub listen_timeout: Duration,
	pub poll_timeout: Duration,
	pub poll_interval: Duration,
	/// Host to bind and advertise instead of the local hostname.
	pub listen_host: Option<String>,
	/// See [`PollChannel::list_parent_on_miss`].
	pub list_parent_on_miss: bool,
	/// Persist phone-home payloads as handoff records (mode 0600).
	pub persist_record: bool,
}

impl Default for HandoffSettings {
	fn default() -> Self {
		Self {
			listen_timeout: DEFAULT_LISTEN_TIMEOUT,
			poll_timeout: DEFAULT_POLL_TIMEOUT,
			poll_interval: DEFAULT_POLL_INTERVAL,
			listen_host: None,
			list_parent_on_miss: false,
			persist_record: true,
		}
	}
}

impl HandoffSettings {
	pub fn listen_timeout(mut self, timeout: Duration) -> Self {
		self.listen_timeout = timeout;
		self
	}

	pub fn poll_timeout(mut self, timeout: Duration) -> Self {
		self.poll_timeout = timeout;
		self
	}

	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn listen_host(mut self, host: impl Into<String>) -> Self {
		self.listen_host = Some(host.into());
		self
	}

	/// Opens a listener on the configured host, or the local hostname.
	pub async fn open_listener(&self) -> Result<ListenerChannel> {
		match &self.listen_host {
			Some(host) => ListenerChannel::open_on(host).await,
			None => ListenerChannel::open().await,
		}
	}
}

/// A channel ready to receive one payload.
#[derive(Debug)]
pub enum HandoffChannel {
	Listener(ListenerChannel),
	Poll(PollChannel),
}

impl HandoffChannel {
	pub fn mode(&self) -> HandoffMode {
		match self {
			HandoffChannel::Listener(_) => HandoffMode::Listener,
			HandoffChannel::Poll(_) => HandoffMode::Poll,
		}
	}

	/// Waits for the raw payload using the timeouts in `settings`.
	pub async fn receive(self, settings: &HandoffSettings, cancel: CancelSignal) -> Result<String> {
		match self {
			HandoffChannel::Listener(channel) => channel.receive(settings.listen_timeout, cancel).await,
			HandoffChannel::Poll(channel) => {
				channel
					.list_parent_on_miss(settings.list_parent_on_miss)
					.receive(settings.poll_timeout, settings.poll_interval, cancel)
					.await
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_timeouts() {
		let settings = HandoffSettings::default();
		assert_eq!(settings.listen_timeout, Duration::from_secs(30));
		assert_eq!(settings.poll_timeout, Duration::from_secs(120));
		assert_eq!(settings.poll_interval, Duration::from_secs(5));
		assert!(settings.persist_record);
	}

	#[test]
	fn mode_serializes_lowercase() {
		assert_eq!(serde_json::to_string(&HandoffMode::Listener).unwrap(), r#""listener""#);
		assert_eq!(HandoffMode::Poll.to_string(), "poll");
	}
}
