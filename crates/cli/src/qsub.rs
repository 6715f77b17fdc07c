//! PBS/Torque scheduler backed by the `qsub` command.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use vnc::{JobId, Scheduler};

/// Submits job scripts by piping them to `qsub` on stdin.
#[derive(Debug, Clone)]
pub struct QsubScheduler {
	program: PathBuf,
	server: Option<String>,
}

impl QsubScheduler {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			server: None,
		}
	}

	/// Routes jobs to `server` with `-q @server`.
	pub fn server(mut self, server: impl Into<String>) -> Self {
		self.server = Some(server.into()).filter(|s: &String| !s.is_empty());
		self
	}
}

#[async_trait]
impl Scheduler for QsubScheduler {
	async fn submit(
		&self,
		script: &str,
		headers: &BTreeMap<String, String>,
		resources: &BTreeMap<String, String>,
		envvars: &BTreeMap<String, String>,
	) -> anyhow::Result<JobId> {
		let mut args = build_args(headers, resources, envvars);
		if let Some(server) = &self.server {
			args.push("-q".into());
			args.push(format!("@{server}"));
		}
		debug!(target = "vnc.qsub", program = %self.program.display(), ?args, "running qsub");

		let mut child = Command::new(&self.program)
			.args(&args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.with_context(|| format!("failed to run {}", self.program.display()))?;

		if let Some(mut stdin) = child.stdin.take() {
			// qsub may reject the job before reading its script; its stderr says why.
			if let Err(err) = stdin.write_all(script.as_bytes()).await {
				if err.kind() != ErrorKind::BrokenPipe {
					return Err(err).context("failed to write job script to qsub");
				}
			}
		}

		let output = child.wait_with_output().await.context("failed waiting for qsub")?;
		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			bail!("qsub exited with {}: {}", output.status, stderr.trim());
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		JobId::new(stdout)
	}
}

/// Command-line flags for the given headers, resources and environment.
///
/// Well-known PBS attributes get their dedicated flag; any other header is
/// passed as `-W name=value`.
pub fn build_args(
	headers: &BTreeMap<String, String>,
	resources: &BTreeMap<String, String>,
	envvars: &BTreeMap<String, String>,
) -> Vec<String> {
	let mut args = Vec::new();

	for (name, value) in headers {
		match header_flag(name) {
			Some(flag) => {
				args.push(flag.to_string());
				args.push(value.clone());
			}
			None => {
				args.push("-W".to_string());
				args.push(format!("{name}={value}"));
			}
		}
	}

	for (name, value) in resources {
		args.push("-l".to_string());
		args.push(format!("{name}={value}"));
	}

	if !envvars.is_empty() {
		let list = envvars
			.iter()
			.map(|(k, v)| {
				if v.contains(',') {
					format!("{k}='{v}'")
				} else {
					format!("{k}={v}")
				}
			})
			.collect::<Vec<_>>()
			.join(",");
		args.push("-v".to_string());
		args.push(list);
	}

	args
}

fn header_flag(name: &str) -> Option<&'static str> {
	Some(match name {
		"Job_Name" => "-N",
		"Output_Path" => "-o",
		"Error_Path" => "-e",
		"Join_Path" => "-j",
		"Shell_Path_List" => "-S",
		"Mail_Users" => "-M",
		"Mail_Points" => "-m",
		"Account_Name" => "-A",
		_ => return None,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn known_headers_use_dedicated_flags() {
		let args = build_args(
			&map(&[("Job_Name", "VNC_Job"), ("Join_Path", "oe"), ("depend", "afterok:1")]),
			&BTreeMap::new(),
			&BTreeMap::new(),
		);
		assert_eq!(args, ["-N", "VNC_Job", "-j", "oe", "-W", "depend=afterok:1"]);
	}

	#[test]
	fn resources_become_l_flags() {
		let args = build_args(
			&BTreeMap::new(),
			&map(&[("nodes", "1:ppn=1:glenn"), ("walltime", "00:05:00")]),
			&BTreeMap::new(),
		);
		assert_eq!(args, ["-l", "nodes=1:ppn=1:glenn", "-l", "walltime=00:05:00"]);
	}

	#[test]
	fn envvars_share_one_v_flag_and_quote_commas() {
		let args = build_args(
			&BTreeMap::new(),
			&BTreeMap::new(),
			&map(&[("OUTDIR", "/home/u/out"), ("VNC_ARGS", "-nohttpd,-noxstartup")]),
		);
		assert_eq!(args, ["-v", "OUTDIR=/home/u/out,VNC_ARGS='-nohttpd,-noxstartup'"]);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn runs_program_and_trims_job_id() {
		use std::os::unix::fs::PermissionsExt;

		let tmp = tempfile::TempDir::new().unwrap();
		let fake = tmp.path().join("qsub");
		std::fs::write(&fake, "#!/bin/sh\ncat > /dev/null\necho '  314.fake-batch  '\n").unwrap();
		std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

		let id = QsubScheduler::new(&fake)
			.submit("#!/bin/bash\n", &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new())
			.await
			.unwrap();
		assert_eq!(id.as_str(), "314.fake-batch");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn failing_program_reports_stderr() {
		use std::os::unix::fs::PermissionsExt;

		let tmp = tempfile::TempDir::new().unwrap();
		let fake = tmp.path().join("qsub");
		std::fs::write(&fake, "#!/bin/sh\ncat > /dev/null\necho 'Unauthorized Request' >&2\nexit 159\n").unwrap();
		std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

		let err = QsubScheduler::new(&fake)
			.submit("#!/bin/bash\n", &BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new())
			.await
			.unwrap_err();
		assert!(format!("{err:#}").contains("Unauthorized Request"));
	}
}
