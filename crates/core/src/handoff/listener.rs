//! Phone-home handoff: the job connects back and writes its payload.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::cancel::CancelSignal;
use crate::error::{Error, Result};

/// Environment variable carrying the advertised listener host.
pub const LISTEN_HOST_VAR: &str = "LISTEN_HOST";
/// Environment variable carrying the advertised listener port.
pub const LISTEN_PORT_VAR: &str = "LISTEN_PORT";

/// Upper bound on a payload; a longer stream is rejected.
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024;

/// A bound, not yet accepting, TCP listener on an OS-assigned port.
///
/// Opened before submission so its address can be handed to the job. The
/// socket closes when the channel is dropped or [`receive`](Self::receive)
/// returns, whatever the outcome.
#[derive(Debug)]
pub struct ListenerChannel {
	listener: TcpListener,
	host: String,
	port: u16,
}

impl ListenerChannel {
	/// Binds on the local hostname.
	pub async fn open() -> Result<Self> {
		Self::open_on(&local_hostname()).await
	}

	/// Binds on `host`, port 0, and advertises `host` with the assigned port.
	pub async fn open_on(host: &str) -> Result<Self> {
		let listener = TcpListener::bind((host, 0)).await?;
		let port = listener.local_addr()?.port();
		info!(target = "vnc.handoff", host, port, "listening for job connect-back");
		Ok(Self {
			listener,
			host: host.to_string(),
			port,
		})
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Address the job should connect back to.
	pub fn advertise(&self) -> (&str, u16) {
		(&self.host, self.port)
	}

	/// `LISTEN_HOST`/`LISTEN_PORT` pairs to merge into the job environment.
	pub fn env(&self) -> [(String, String); 2] {
		let (host, port) = self.advertise();
		[
			(LISTEN_HOST_VAR.to_string(), host.to_string()),
			(LISTEN_PORT_VAR.to_string(), port.to_string()),
		]
	}

	/// Accepts one connection and reads until the peer closes.
	///
	/// The whole exchange, accept plus read, must finish within `timeout`.
	/// A stream longer than [`MAX_PAYLOAD_BYTES`] is an
	/// [`Error::OversizedHandoff`]. Non-UTF-8 bytes are replaced; the contract
	/// check happens downstream.
	pub async fn receive(self, timeout: Duration, mut cancel: CancelSignal) -> Result<String> {
		let Self { listener, host, port } = self;
		if cancel.is_cancelled() {
			return Err(Error::HandoffCancelled { channel: "listener" });
		}

		let exchange = async move {
			let (stream, peer) = listener.accept().await?;
			debug!(target = "vnc.handoff", %peer, "job connected");
			let mut buf = Vec::new();
			stream.take(MAX_PAYLOAD_BYTES + 1).read_to_end(&mut buf).await?;
			if buf.len() as u64 > MAX_PAYLOAD_BYTES {
				return Err(Error::OversizedHandoff {
					channel: "listener",
					limit_bytes: MAX_PAYLOAD_BYTES,
				});
			}
			Ok::<_, Error>(String::from_utf8_lossy(&buf).into_owned())
		};

		tokio::select! {
			outcome = tokio::time::timeout(timeout, exchange) => match outcome {
				Ok(Ok(payload)) => {
					debug!(target = "vnc.handoff", bytes = payload.len(), "received payload");
					Ok(payload)
				}
				Ok(Err(err)) => {
					warn!(target = "vnc.handoff", error = %err, "connect-back failed");
					Err(err)
				}
				Err(_) => {
					warn!(target = "vnc.handoff", host = %host, port, ?timeout, "no connect-back before timeout");
					Err(Error::HandoffTimeout {
						channel: "listener",
						timeout_ms: millis(timeout),
					})
				}
			},
			_ = cancel.cancelled() => Err(Error::HandoffCancelled { channel: "listener" }),
		}
	}
}

/// This machine's hostname, or `localhost` when it cannot be read.
pub fn local_hostname() -> String {
	#[cfg(unix)]
	{
		let mut buf = [0u8; 256];
		let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
		if rc == 0 {
			let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
			if let Ok(name) = std::str::from_utf8(&buf[..end]) {
				if !name.is_empty() {
					return name.to_string();
				}
			}
		}
	}
	"localhost".to_string()
}

pub(crate) fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use std::time::Instant;

	use tokio::io::AsyncWriteExt;
	use tokio::net::TcpStream;

	use super::*;
	use crate::handoff::cancel::cancellation;

	#[tokio::test]
	async fn receives_payload_until_eof() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let port = channel.port();
		assert_ne!(port, 0);

		tokio::spawn(async move {
			let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
			stream.write_all(b"Host: node01\nPort: 5901\n").await.unwrap();
			stream.write_all(b"Display: :1\nPass: secret\n").await.unwrap();
		});

		let payload = channel.receive(Duration::from_secs(5), CancelSignal::never()).await.unwrap();
		assert_eq!(payload, "Host: node01\nPort: 5901\nDisplay: :1\nPass: secret\n");
	}

	#[tokio::test]
	async fn payload_at_the_limit_is_accepted() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let port = channel.port();
		let body = format!("{}Host: h\nPort: 1\nDisplay: :1\nPass: p\n", "#".repeat(1000));
		let padded = format!("{}{body}", " ".repeat(MAX_PAYLOAD_BYTES as usize - body.len()));
		let sent = padded.clone();

		tokio::spawn(async move {
			let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
			stream.write_all(sent.as_bytes()).await.unwrap();
		});

		let payload = channel.receive(Duration::from_secs(5), CancelSignal::never()).await.unwrap();
		assert_eq!(payload.len() as u64, MAX_PAYLOAD_BYTES);
		assert_eq!(payload, padded);
	}

	#[tokio::test]
	async fn oversized_payload_is_rejected_not_truncated() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let port = channel.port();

		tokio::spawn(async move {
			let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
			let preamble = "x".repeat(72_000);
			let _ = stream.write_all(preamble.as_bytes()).await;
			let _ = stream.write_all(b"Host: node01\nPort: 5901\nDisplay: :1\nPass: secret\n").await;
		});

		let err = channel
			.receive(Duration::from_secs(5), CancelSignal::never())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			Error::OversizedHandoff {
				channel: "listener",
				limit_bytes: MAX_PAYLOAD_BYTES
			}
		));
		assert_eq!(err.code(), "MALFORMED_HANDOFF");
	}

	#[tokio::test]
	async fn times_out_and_releases_the_port() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let port = channel.port();

		let started = Instant::now();
		let err = channel
			.receive(Duration::from_millis(200), CancelSignal::never())
			.await
			.unwrap_err();
		assert!(matches!(err, Error::HandoffTimeout { channel: "listener", timeout_ms: 200 }));
		assert!(started.elapsed() >= Duration::from_millis(200));
		assert!(started.elapsed() < Duration::from_secs(2));

		std::net::TcpListener::bind(("127.0.0.1", port)).expect("port released after timeout");
	}

	#[tokio::test]
	async fn silent_peer_counts_against_the_timeout() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let port = channel.port();
		let _peer = tokio::spawn(async move {
			let _stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
			tokio::time::sleep(Duration::from_secs(5)).await;
		});

		let err = channel
			.receive(Duration::from_millis(200), CancelSignal::never())
			.await
			.unwrap_err();
		assert!(err.is_timeout());
	}

	#[tokio::test]
	async fn cancellation_ends_the_wait() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let (handle, signal) = cancellation();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			handle.cancel();
		});

		let err = channel.receive(Duration::from_secs(10), signal).await.unwrap_err();
		assert!(matches!(err, Error::HandoffCancelled { channel: "listener" }));
	}

	#[tokio::test]
	async fn env_advertises_host_and_port() {
		let channel = ListenerChannel::open_on("127.0.0.1").await.unwrap();
		let [host, port] = channel.env();
		assert_eq!(host, (LISTEN_HOST_VAR.to_string(), "127.0.0.1".to_string()));
		assert_eq!(port, (LISTEN_PORT_VAR.to_string(), channel.port().to_string()));
	}

	#[test]
	fn hostname_is_never_empty() {
		assert!(!local_hostname().is_empty());
	}
}
