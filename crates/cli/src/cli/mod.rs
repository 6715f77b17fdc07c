use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use vnc::ConnFormat;
use vnc::handoff::{DEFAULT_LISTEN_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(name = "vnc")]
#[command(about = "Launch VNC sessions through the batch scheduler")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default), json, or ndjson
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Catalog file layered over the built-in batch and cluster defaults
	#[arg(long, global = true, value_name = "FILE")]
	pub catalog: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Submit a session job and wait for its connection parameters
	Submit(SubmitArgs),

	/// Show the merged configuration a session would be rendered with
	Resolve(ResolveArgs),

	/// Print the connection record a finished handoff left behind
	Conn(ConnArgs),
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Submit(_) => "submit",
			Commands::Resolve(_) => "resolve",
			Commands::Conn(_) => "conn",
		}
	}
}

/// Batch server, cluster and user overrides shared by `submit` and `resolve`.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
	/// Batch server id from the catalog [default: oxymoron]
	#[arg(short, long, value_name = "ID")]
	pub batch: Option<String>,

	/// Cluster id from the catalog [default: glenn]
	#[arg(short, long, value_name = "ID")]
	pub cluster: Option<String>,

	/// Override a config value (VALUE is parsed as JSON, else taken as a string)
	#[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
	pub set: Vec<(String, String)>,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
	/// Script run inside the session once the server is up
	#[arg(value_name = "XSTARTUP")]
	pub xstartup: PathBuf,

	/// Script run after the session ends
	#[arg(long, value_name = "FILE")]
	pub xlogout: Option<PathBuf>,

	/// Directory for job output and connection records [default: .]
	#[arg(short, long, value_name = "DIR")]
	pub outdir: Option<PathBuf>,

	/// Requested walltime as HH:MM:SS
	#[arg(short, long, value_name = "HH:MM:SS")]
	pub walltime: Option<String>,

	#[command(flatten)]
	pub config: ConfigArgs,

	/// Scheduler header, e.g. Job_Name=mysession
	#[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_key_val)]
	pub headers: Vec<(String, String)>,

	/// Scheduler resource, e.g. nodes=1:ppn=12
	#[arg(short = 'l', long = "resource", value_name = "NAME=VALUE", value_parser = parse_key_val)]
	pub resources: Vec<(String, String)>,

	/// Extra environment variable for the job
	#[arg(short = 'e', long = "env", value_name = "NAME=VALUE", value_parser = parse_key_val)]
	pub envvars: Vec<(String, String)>,

	/// Presentation of the connection parameters: text, jnlp, url, or json
	#[arg(long, value_name = "FORMAT", default_value = "text")]
	pub conn_format: ConnFormat,

	/// qsub executable
	#[arg(long, value_name = "PROGRAM", default_value = "qsub")]
	pub qsub: PathBuf,

	/// Host the phone-home listener binds and advertises [default: hostname]
	#[arg(long, value_name = "HOST")]
	pub listen_host: Option<String>,

	/// How long to wait for a phone-home connection
	#[arg(long, value_name = "MS", default_value_t = millis(DEFAULT_LISTEN_TIMEOUT))]
	pub listen_timeout_ms: u64,

	/// How long to wait for a connection record to appear
	#[arg(long, value_name = "MS", default_value_t = millis(DEFAULT_POLL_TIMEOUT))]
	pub poll_timeout_ms: u64,

	/// Pause between connection record checks
	#[arg(long, value_name = "MS", default_value_t = millis(DEFAULT_POLL_INTERVAL))]
	pub poll_interval_ms: u64,

	/// List the output directory after each missed check (for NFS negative caching)
	#[arg(long)]
	pub list_parent_on_miss: bool,

	/// Do not keep a connection record for phone-home sessions
	#[arg(long)]
	pub no_record: bool,
}

impl SubmitArgs {
	pub fn listen_timeout(&self) -> Duration {
		Duration::from_millis(self.listen_timeout_ms)
	}

	pub fn poll_timeout(&self) -> Duration {
		Duration::from_millis(self.poll_timeout_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}

#[derive(Args, Debug, Default)]
pub struct ResolveArgs {
	#[command(flatten)]
	pub config: ConfigArgs,

	/// Script the session would start (adds the xstartup keys)
	#[arg(long, value_name = "FILE")]
	pub xstartup: Option<PathBuf>,

	/// Output directory the session would use [default: .]
	#[arg(short, long, value_name = "DIR")]
	pub outdir: Option<PathBuf>,

	/// Walltime the session would request, as HH:MM:SS
	#[arg(short, long, value_name = "HH:MM:SS")]
	pub walltime: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConnArgs {
	/// Job id the record was written for
	#[arg(value_name = "JOB_ID")]
	pub job_id: String,

	/// Directory holding the record [default: .]
	#[arg(short, long, value_name = "DIR")]
	pub outdir: Option<PathBuf>,

	/// Presentation of the connection parameters: text, jnlp, url, or json
	#[arg(long, value_name = "FORMAT", default_value = "text")]
	pub conn_format: ConnFormat,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
	let (key, value) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("empty key in '{s}'"));
	}
	Ok((key.to_string(), value.to_string()))
}

fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
