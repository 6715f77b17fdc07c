//! Submit a session job and wait for its connection handoff.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use vnc_protocol::{ConnFormat, ConnectionInfo};

use crate::config::ConfigCatalog;
use crate::error::{Error, Result};
use crate::handoff::{
	CancelSignal, HandoffChannel, HandoffMode, HandoffSettings, PollChannel, conn_path, write_private,
};
use crate::request::{SessionOptions, SessionRequest};
use crate::scheduler::{JobId, Scheduler};
use crate::template::{EmbeddedTemplates, TemplateRenderer};

/// A launched session: the job it runs in and how to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
	job_id: JobId,
	batch: String,
	cluster: String,
	outdir: PathBuf,
	mode: HandoffMode,
	connection: ConnectionInfo,
}

impl Session {
	pub fn job_id(&self) -> &JobId {
		&self.job_id
	}

	pub fn batch(&self) -> &str {
		&self.batch
	}

	pub fn cluster(&self) -> &str {
		&self.cluster
	}

	pub fn outdir(&self) -> &Path {
		&self.outdir
	}

	pub fn mode(&self) -> HandoffMode {
		self.mode
	}

	pub fn connection(&self) -> &ConnectionInfo {
		&self.connection
	}

	pub fn into_connection(self) -> ConnectionInfo {
		self.connection
	}

	/// Connection parameters in a client-facing format.
	pub fn render(&self, format: ConnFormat) -> Result<String> {
		Ok(self.connection.render(format)?)
	}
}

/// Renders, submits, and waits for one session at a time.
///
/// A submitter holds no per-session state, so one instance can serve
/// concurrent sessions; each call opens its own channel.
pub struct Submitter<S, R = EmbeddedTemplates> {
	scheduler: S,
	renderer: R,
	/// Falls back to [`ConfigCatalog::builtin`] when unset.
	catalog: Option<ConfigCatalog>,
	settings: HandoffSettings,
	cancel: CancelSignal,
}

impl<S: Scheduler> Submitter<S> {
	/// Submitter using the embedded templates and built-in catalog.
	pub fn new(scheduler: S) -> Self {
		Self::with_renderer(scheduler, EmbeddedTemplates::new())
	}
}

impl<S: Scheduler, R: TemplateRenderer> Submitter<S, R> {
	pub fn with_renderer(scheduler: S, renderer: R) -> Self {
		Self {
			scheduler,
			renderer,
			catalog: None,
			settings: HandoffSettings::default(),
			cancel: CancelSignal::never(),
		}
	}

	pub fn catalog(mut self, catalog: ConfigCatalog) -> Self {
		self.catalog = Some(catalog);
		self
	}

	pub fn settings(mut self, settings: HandoffSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Aborts in-flight handoff waits when `signal` fires.
	pub fn cancel_on(mut self, signal: CancelSignal) -> Self {
		self.cancel = signal;
		self
	}

	pub fn handoff_settings(&self) -> &HandoffSettings {
		&self.settings
	}

	/// Validates `opts` against the catalog, then [`submit`](Self::submit)s.
	///
	/// Validation failures are returned before the scheduler is called.
	pub async fn launch(&self, opts: SessionOptions) -> Result<ConnectionInfo> {
		let request = match &self.catalog {
			Some(catalog) => SessionRequest::build(opts, catalog)?,
			None => SessionRequest::build(opts, &ConfigCatalog::builtin()?)?,
		};
		self.submit(request).await
	}

	/// Submits `request` and returns the parsed connection parameters.
	pub async fn submit(&self, request: SessionRequest) -> Result<ConnectionInfo> {
		Ok(self.submit_session(request).await?.into_connection())
	}

	/// Like [`submit`](Self::submit), also reporting the job id and channel.
	///
	/// The listener, when used, is bound before the scheduler is called and
	/// closed on every exit path. The scheduler is called exactly once.
	pub async fn submit_session(&self, request: SessionRequest) -> Result<Session> {
		request.revalidate()?;

		let context = request.context();
		let script = self.renderer.render(context.template_id(), context)?;

		let mut envvars = request.job_env();
		let listener = if context.phone_home() {
			let listener = self.settings.open_listener().await?;
			envvars.extend(listener.env());
			Some(listener)
		} else {
			None
		};

		tokio::fs::create_dir_all(request.outdir()).await?;

		let job_id = self
			.scheduler
			.submit(&script, request.headers(), request.resources(), &envvars)
			.await
			.map_err(Error::Submission)?;

		let channel = match listener {
			Some(listener) => HandoffChannel::Listener(listener),
			None => HandoffChannel::Poll(PollChannel::new(request.outdir(), &job_id)),
		};
		let mode = channel.mode();
		info!(
			target = "vnc.submit",
			job_id = %job_id,
			batch = request.batch(),
			cluster = request.cluster(),
			mode = %mode,
			"job submitted, waiting for handoff"
		);

		let payload = channel.receive(&self.settings, self.cancel.clone()).await.inspect_err(|err| {
			warn!(target = "vnc.submit", job_id = %job_id, error = %err, "handoff failed");
		})?;
		let connection = ConnectionInfo::parse(&payload)?;

		if mode == HandoffMode::Listener && self.settings.persist_record {
			let path = conn_path(request.outdir(), &job_id);
			write_private(&path, &payload)?;
			debug!(target = "vnc.submit", path = %path.display(), "persisted handoff record");
		}

		info!(
			target = "vnc.submit",
			job_id = %job_id,
			host = connection.host(),
			port = connection.port(),
			"session ready"
		);

		Ok(Session {
			job_id,
			batch: request.batch().to_string(),
			cluster: request.cluster().to_string(),
			outdir: request.outdir().to_path_buf(),
			mode,
			connection,
		})
	}
}
