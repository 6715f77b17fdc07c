//! Command handlers. Each returns its envelope data; `dispatch` prints it.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use vnc::{
	ConfigCatalog, ConfigTable, ConnectionInfo, HandoffMode, HandoffSettings, JobId, SessionKeys, SessionOptions,
	SessionRequest, Submitter, cancellation, read_record,
};

use crate::cli::{Cli, Commands, ConfigArgs, ConnArgs, ResolveArgs, SubmitArgs};
use crate::error::{CliError, Result};
use crate::output::{self, OutputFormat, ResultBuilder};
use crate::qsub::QsubScheduler;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitData {
	pub job_id: JobId,
	pub batch: String,
	pub cluster: String,
	pub mode: HandoffMode,
	pub connection: ConnectionInfo,
	/// The connection rendered in the requested `--conn-format`.
	pub rendered: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveData {
	pub batch: String,
	pub cluster: String,
	pub context: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnData {
	pub job_id: JobId,
	pub connection: ConnectionInfo,
	pub rendered: String,
}

/// Runs the parsed command and prints its result in `format`.
pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	let started = Instant::now();
	let catalog = ConfigCatalog::load_layered(cli.catalog.as_deref())?;

	match cli.command {
		Commands::Submit(args) => {
			let data = submit(args, &catalog).await?;
			emit("submit", data, format, started, |d| d.rendered.clone());
		}
		Commands::Resolve(args) => {
			let data = resolve(args, &catalog)?;
			emit("resolve", data, format, started, |d| {
				d.context.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
			});
		}
		Commands::Conn(args) => {
			let data = conn(args)?;
			emit("conn", data, format, started, |d| d.rendered.clone());
		}
	}
	Ok(())
}

fn emit<T: Serialize>(
	command: &str,
	data: T,
	format: OutputFormat,
	started: Instant,
	text: impl FnOnce(&T) -> String,
) {
	match format {
		OutputFormat::Text => {
			let body = text(&data);
			if body.ends_with('\n') {
				print!("{body}");
			} else {
				println!("{body}");
			}
		}
		OutputFormat::Json | OutputFormat::Ndjson => {
			let result = ResultBuilder::new(command).started_at(started).data(data).build();
			output::print_result(&result, format);
		}
	}
}

async fn submit(args: SubmitArgs, catalog: &ConfigCatalog) -> Result<SubmitData> {
	let settings = HandoffSettings {
		listen_timeout: args.listen_timeout(),
		poll_timeout: args.poll_timeout(),
		poll_interval: args.poll_interval(),
		listen_host: args.listen_host.clone(),
		list_parent_on_miss: args.list_parent_on_miss,
		persist_record: !args.no_record,
	};
	let conn_format = args.conn_format;

	let mut opts = SessionOptions::new(args.xstartup);
	opts.xlogout = args.xlogout;
	opts.outdir = args.outdir;
	opts.walltime = args.walltime;
	opts.batch = args.config.batch.clone();
	opts.cluster = args.config.cluster.clone();
	opts.options = user_table(&args.config);
	opts.headers = args.headers.into_iter().collect();
	opts.resources = args.resources.into_iter().collect();
	opts.envvars = args.envvars.into_iter().collect();

	let request = SessionRequest::build(opts, catalog)?;

	let server = request.context().get("server").unwrap_or_default().to_string();
	let scheduler = QsubScheduler::new(args.qsub).server(server);

	let (cancel, signal) = cancellation();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!(target = "vnc.cli", "interrupted, abandoning handoff wait");
			cancel.cancel();
		}
	});

	let session = Submitter::new(scheduler)
		.settings(settings)
		.cancel_on(signal)
		.submit_session(request)
		.await?;

	Ok(SubmitData {
		rendered: session.render(conn_format)?,
		job_id: session.job_id().clone(),
		batch: session.batch().to_string(),
		cluster: session.cluster().to_string(),
		mode: session.mode(),
		connection: session.connection().clone(),
	})
}

fn resolve(args: ResolveArgs, catalog: &ConfigCatalog) -> Result<ResolveData> {
	let batch = args.config.batch.clone().unwrap_or_else(|| vnc::config::DEFAULT_BATCH.to_string());
	let cluster = args.config.cluster.clone().unwrap_or_else(|| vnc::config::DEFAULT_CLUSTER.to_string());
	let xstartup = args.xstartup.as_deref().map(std::path::absolute).transpose()?;
	let outdir = match &args.outdir {
		Some(dir) => std::path::absolute(dir)?,
		None => std::env::current_dir()?,
	};

	let context = SessionKeys {
		batch: &batch,
		cluster: &cluster,
		xstartup: xstartup.as_deref(),
		xlogout: None,
		outdir: Some(outdir.as_path()),
		walltime: args.walltime.as_deref(),
	}
	.resolve(catalog, user_table(&args.config))?;
	debug!(target = "vnc.cli", batch = %batch, cluster = %cluster, keys = context.len(), "resolved context");

	Ok(ResolveData {
		batch,
		cluster,
		context: context.as_map().clone(),
	})
}

fn conn(args: ConnArgs) -> Result<ConnData> {
	let job_id = JobId::new(&args.job_id).map_err(|e| CliError::InvalidInput(format!("{e:#}")))?;
	let outdir = match args.outdir {
		Some(dir) => dir,
		None => std::env::current_dir()?,
	};
	let connection = read_record(&outdir, &job_id)?;
	Ok(ConnData {
		rendered: connection.render(args.conn_format).map_err(vnc::Error::from)?,
		job_id,
		connection,
	})
}

/// `--set` pairs as the user tier. Values that parse as JSON keep their type.
fn user_table(args: &ConfigArgs) -> ConfigTable {
	args.set
		.iter()
		.map(|(key, raw)| {
			let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()));
			(key.clone(), value)
		})
		.collect()
}
