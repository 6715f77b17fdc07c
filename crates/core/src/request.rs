//! Validated, immutable description of a session to launch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::{ConfigCatalog, ConfigTable, DEFAULT_BATCH, DEFAULT_CLUSTER, ResolvedContext};
use crate::error::{Result, ValidationError};

// Scheduler header names with defaults; caller headers override them.
pub const HEADER_JOB_NAME: &str = "Job_Name";
pub const HEADER_OUTPUT_PATH: &str = "Output_Path";
pub const HEADER_JOIN_PATH: &str = "Join_Path";
pub const HEADER_SHELL: &str = "Shell_Path_List";

/// Caller-supplied, unvalidated session options.
///
/// Turn into a [`SessionRequest`] with [`SessionRequest::build`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
	pub xstartup: Option<PathBuf>,
	pub xlogout: Option<PathBuf>,
	/// Defaults to the current working directory.
	pub outdir: Option<PathBuf>,
	/// Defaults to [`DEFAULT_BATCH`].
	pub batch: Option<String>,
	/// Defaults to [`DEFAULT_CLUSTER`].
	pub cluster: Option<String>,
	pub walltime: Option<String>,
	/// User tier of the config merge.
	pub options: ConfigTable,
	pub headers: BTreeMap<String, String>,
	pub resources: BTreeMap<String, String>,
	pub envvars: BTreeMap<String, String>,
}

impl SessionOptions {
	pub fn new(xstartup: impl Into<PathBuf>) -> Self {
		Self {
			xstartup: Some(xstartup.into()),
			..Default::default()
		}
	}

	pub fn xlogout(mut self, path: impl Into<PathBuf>) -> Self {
		self.xlogout = Some(path.into());
		self
	}

	pub fn outdir(mut self, path: impl Into<PathBuf>) -> Self {
		self.outdir = Some(path.into());
		self
	}

	pub fn batch(mut self, id: impl Into<String>) -> Self {
		self.batch = Some(id.into());
		self
	}

	pub fn cluster(mut self, id: impl Into<String>) -> Self {
		self.cluster = Some(id.into());
		self
	}

	pub fn walltime(mut self, walltime: impl Into<String>) -> Self {
		self.walltime = Some(walltime.into());
		self
	}

	pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.options.insert(key.into(), value.into());
		self
	}

	pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(key.into(), value.into());
		self
	}

	pub fn resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.resources.insert(key.into(), value.into());
		self
	}

	pub fn envvar(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.envvars.insert(key.into(), value.into());
		self
	}
}

/// A session description that passed validation.
///
/// Fields are private; a request is built once and consumed by the submitter.
#[derive(Debug, Clone)]
pub struct SessionRequest {
	xstartup: PathBuf,
	xlogout: Option<PathBuf>,
	outdir: PathBuf,
	batch: String,
	cluster: String,
	context: ResolvedContext,
	headers: BTreeMap<String, String>,
	resources: BTreeMap<String, String>,
	envvars: BTreeMap<String, String>,
}

impl SessionRequest {
	/// Validates `opts` and resolves its config against `catalog`.
	///
	/// Checks run in this order, stopping at the first failure: xstartup is an
	/// existing file, outdir is not a plain file, xlogout (when given) is an
	/// existing file, the cluster is known, the requested walltime is lexically
	/// `DD:DD:DD`, the batch id resolves, and finally the walltime the merged
	/// context ends up with is checked again, whichever tier supplied it.
	pub fn build(opts: SessionOptions, catalog: &ConfigCatalog) -> Result<Self> {
		let xstartup = match opts.xstartup {
			Some(path) => absolute(&path)?,
			None => {
				return Err(ValidationError::InvalidPath {
					path: PathBuf::new(),
					reason: "xstartup script is not specified",
				}
				.into());
			}
		};
		check_xstartup(&xstartup)?;

		let outdir = match opts.outdir {
			Some(path) => absolute(&path)?,
			None => std::env::current_dir()?,
		};
		check_outdir(&outdir)?;

		let xlogout = opts.xlogout.as_deref().map(absolute).transpose()?;
		if let Some(xlogout) = &xlogout {
			check_xlogout(xlogout)?;
		}

		let cluster = opts.cluster.unwrap_or_else(|| DEFAULT_CLUSTER.to_string());
		if !catalog.has_cluster(&cluster) {
			return Err(ValidationError::InvalidCluster(cluster).into());
		}

		if let Some(walltime) = &opts.walltime {
			if !is_walltime(walltime) {
				return Err(ValidationError::InvalidWalltime(walltime.clone()).into());
			}
		}

		let batch = opts.batch.unwrap_or_else(|| DEFAULT_BATCH.to_string());

		let context = SessionKeys {
			batch: &batch,
			cluster: &cluster,
			xstartup: Some(xstartup.as_path()),
			xlogout: xlogout.as_deref(),
			outdir: Some(outdir.as_path()),
			walltime: opts.walltime.as_deref(),
		}
		.resolve(catalog, opts.options)?;

		let mut headers = BTreeMap::from([
			(HEADER_JOB_NAME.to_string(), "VNC_Job".to_string()),
			(HEADER_OUTPUT_PATH.to_string(), format!("{}/$PBS_JOBID.output", outdir.display())),
			(HEADER_JOIN_PATH.to_string(), "oe".to_string()),
			(HEADER_SHELL.to_string(), "/bin/bash".to_string()),
		]);
		headers.extend(opts.headers);

		let mut resources = BTreeMap::from([("nodes".to_string(), format!("1:ppn=1:{cluster}"))]);
		if let Some(walltime) = context.walltime() {
			resources.insert("walltime".to_string(), walltime.to_string());
		}
		resources.extend(opts.resources);

		debug!(
			target = "vnc.request",
			batch = %batch,
			cluster = %cluster,
			xstartup = %xstartup.display(),
			outdir = %outdir.display(),
			keys = context.len(),
			"session request validated"
		);

		Ok(Self {
			xstartup,
			xlogout,
			outdir,
			batch,
			cluster,
			context,
			headers,
			resources,
			envvars: opts.envvars,
		})
	}

	/// Re-checks the path invariants, which may have changed since [`build`](Self::build).
	pub fn revalidate(&self) -> Result<()> {
		check_xstartup(&self.xstartup)?;
		check_outdir(&self.outdir)?;
		if let Some(xlogout) = &self.xlogout {
			check_xlogout(xlogout)?;
		}
		Ok(())
	}

	pub fn xstartup(&self) -> &Path {
		&self.xstartup
	}

	pub fn xlogout(&self) -> Option<&Path> {
		self.xlogout.as_deref()
	}

	pub fn outdir(&self) -> &Path {
		&self.outdir
	}

	pub fn batch(&self) -> &str {
		&self.batch
	}

	pub fn cluster(&self) -> &str {
		&self.cluster
	}

	pub fn context(&self) -> &ResolvedContext {
		&self.context
	}

	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}

	pub fn resources(&self) -> &BTreeMap<String, String> {
		&self.resources
	}

	/// Environment passed to the job: one variable per context key, then the
	/// caller's envvars on top.
	pub fn job_env(&self) -> BTreeMap<String, String> {
		let mut env = self.context.to_env();
		env.extend(self.envvars.iter().map(|(k, v)| (k.clone(), v.clone())));
		env
	}
}

/// Session ids and paths layered over the user tier of a context.
///
/// Shared by [`SessionRequest::build`] and callers that only want to preview
/// the context a session would be rendered with.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionKeys<'a> {
	pub batch: &'a str,
	pub cluster: &'a str,
	pub xstartup: Option<&'a Path>,
	pub xlogout: Option<&'a Path>,
	pub outdir: Option<&'a Path>,
	pub walltime: Option<&'a str>,
}

impl SessionKeys<'_> {
	/// Resolves `user` with these keys on top, then checks the merged walltime.
	pub fn resolve(&self, catalog: &ConfigCatalog, mut user: ConfigTable) -> Result<ResolvedContext> {
		user.insert("batch".into(), Value::String(self.batch.to_string()));
		user.insert("cluster".into(), Value::String(self.cluster.to_string()));
		if let Some(xstartup) = self.xstartup {
			user.insert("xstartup".into(), path_value(xstartup));
			if let Some(dir) = xstartup.parent() {
				user.insert("xstartup_dir".into(), path_value(dir));
			}
		}
		if let Some(xlogout) = self.xlogout {
			user.insert("xlogout".into(), path_value(xlogout));
		}
		if let Some(outdir) = self.outdir {
			user.insert("outdir".into(), path_value(outdir));
		}
		if let Some(walltime) = self.walltime {
			user.insert("walltime".into(), Value::String(walltime.to_string()));
		}

		let context = catalog.resolve(self.batch, self.cluster, &user)?;
		if let Some(walltime) = context.walltime() {
			if !is_walltime(walltime) {
				return Err(ValidationError::InvalidWalltime(walltime.to_string()).into());
			}
		}
		Ok(context)
	}
}

/// Lexical `DD:DD:DD` check.
///
/// Only the shape is checked: `99:99:99` passes.
pub fn is_walltime(value: &str) -> bool {
	let bytes = value.as_bytes();
	bytes.len() == 8
		&& bytes.iter().enumerate().all(|(i, b)| match i {
			2 | 5 => *b == b':',
			_ => b.is_ascii_digit(),
		})
}

fn check_xstartup(path: &Path) -> std::result::Result<(), ValidationError> {
	if !path.is_file() {
		return Err(ValidationError::InvalidPath {
			path: path.to_path_buf(),
			reason: "xstartup script is not found",
		});
	}
	Ok(())
}

fn check_xlogout(path: &Path) -> std::result::Result<(), ValidationError> {
	if !path.is_file() {
		return Err(ValidationError::InvalidPath {
			path: path.to_path_buf(),
			reason: "xlogout script is not found",
		});
	}
	Ok(())
}

fn check_outdir(path: &Path) -> std::result::Result<(), ValidationError> {
	if path.is_file() {
		return Err(ValidationError::InvalidPath {
			path: path.to_path_buf(),
			reason: "output directory is a file",
		});
	}
	Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
	Ok(std::path::absolute(path)?)
}

fn path_value(path: &Path) -> Value {
	Value::String(path.display().to_string())
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;
	use crate::error::Error;

	fn fixture() -> (TempDir, PathBuf) {
		let tmp = TempDir::new().unwrap();
		let xstartup = tmp.path().join("xstartup");
		std::fs::write(&xstartup, "#!/bin/sh\n").unwrap();
		(tmp, xstartup)
	}

	fn validation(err: Error) -> ValidationError {
		match err {
			Error::Validation(v) => v,
			other => panic!("expected validation error, got {other:?}"),
		}
	}

	#[test]
	fn walltime_pattern_is_lexical() {
		assert!(is_walltime("00:05:00"));
		assert!(is_walltime("99:99:99"));
		assert!(!is_walltime("5:5:5"));
		assert!(!is_walltime("00:05:00 "));
		assert!(!is_walltime("00-05-00"));
		assert!(!is_walltime("0a:05:00"));
		assert!(!is_walltime(""));
	}

	#[test]
	fn builds_with_defaults() {
		let (tmp, xstartup) = fixture();
		let outdir = tmp.path().join("out");
		let request = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(&outdir).walltime("00:05:00"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap();

		assert_eq!(request.batch(), DEFAULT_BATCH);
		assert_eq!(request.cluster(), DEFAULT_CLUSTER);
		assert_eq!(request.outdir(), outdir);
		assert!(!outdir.exists(), "build must not create the output directory");
		assert_eq!(request.context().get("cluster"), Some("glenn"));
		assert_eq!(request.context().walltime(), Some("00:05:00"));
		assert_eq!(request.resources().get("walltime").map(String::as_str), Some("00:05:00"));
		assert_eq!(request.resources().get("nodes").map(String::as_str), Some("1:ppn=1:glenn"));
		assert_eq!(
			request.headers().get(HEADER_OUTPUT_PATH).cloned(),
			Some(format!("{}/$PBS_JOBID.output", outdir.display()))
		);
	}

	#[test]
	fn caller_maps_override_defaults() {
		let (tmp, xstartup) = fixture();
		let request = SessionRequest::build(
			SessionOptions::new(&xstartup)
				.outdir(tmp.path())
				.header(HEADER_JOB_NAME, "mysession")
				.resource("nodes", "1:ppn=12")
				.envvar("OUTDIR", "/elsewhere")
				.option("geometry", "800x600"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap();

		assert_eq!(request.headers()[HEADER_JOB_NAME], "mysession");
		assert_eq!(request.resources()["nodes"], "1:ppn=12");
		assert_eq!(request.context().get("geometry"), Some("800x600"));
		let env = request.job_env();
		assert_eq!(env["OUTDIR"], "/elsewhere");
		assert_eq!(env["GEOMETRY"], "800x600");
	}

	#[test]
	fn missing_xstartup_is_invalid_path() {
		let tmp = TempDir::new().unwrap();
		let err = SessionRequest::build(
			SessionOptions::new(tmp.path().join("nope")).outdir(tmp.path()),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidPath { .. }));
	}

	#[test]
	fn xstartup_directory_is_invalid_path() {
		let tmp = TempDir::new().unwrap();
		let err = SessionRequest::build(SessionOptions::new(tmp.path()), &ConfigCatalog::builtin().unwrap()).unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidPath { .. }));
	}

	#[test]
	fn outdir_that_is_a_file_is_invalid_path() {
		let (_tmp, xstartup) = fixture();
		let err = SessionRequest::build(SessionOptions::new(&xstartup).outdir(&xstartup), &ConfigCatalog::builtin().unwrap())
			.unwrap_err();
		match validation(err) {
			ValidationError::InvalidPath { reason, .. } => assert_eq!(reason, "output directory is a file"),
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn unknown_cluster_is_invalid_cluster() {
		let (tmp, xstartup) = fixture();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).cluster("owens"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidCluster(ref c) if c == "owens"));
	}

	#[test]
	fn bad_walltime_is_rejected() {
		let (tmp, xstartup) = fixture();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).walltime("5:5:5"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidWalltime(ref w) if w == "5:5:5"));
	}

	#[test]
	fn walltime_from_user_options_is_checked() {
		let (tmp, xstartup) = fixture();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).option("walltime", "5:5:5"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidWalltime(ref w) if w == "5:5:5"));
	}

	#[test]
	fn walltime_from_the_catalog_is_checked() {
		let (tmp, xstartup) = fixture();
		let catalog = ConfigCatalog::from_json(
			r#"{ "batch": { "b": { "walltime": "1 hour" } }, "cluster": { "c": {} } }"#,
		)
		.unwrap();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).batch("b").cluster("c"),
			&catalog,
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::InvalidWalltime(ref w) if w == "1 hour"));
	}

	#[test]
	fn missing_xlogout_is_invalid_path() {
		let (tmp, xstartup) = fixture();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).xlogout(tmp.path().join("nope")),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		match validation(err) {
			ValidationError::InvalidPath { reason, .. } => assert_eq!(reason, "xlogout script is not found"),
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn existing_xlogout_lands_in_context() {
		let (tmp, xstartup) = fixture();
		let xlogout = tmp.path().join("xlogout");
		std::fs::write(&xlogout, "#!/bin/sh\n").unwrap();
		let request = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).xlogout(&xlogout),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap();
		assert_eq!(request.xlogout(), Some(xlogout.as_path()));
		assert_eq!(request.context().get("xlogout"), Some(xlogout.display().to_string().as_str()));
	}

	#[test]
	fn session_keys_without_paths_still_name_batch_and_cluster() {
		let context = SessionKeys {
			batch: DEFAULT_BATCH,
			cluster: "ruby",
			..Default::default()
		}
		.resolve(&ConfigCatalog::builtin().unwrap(), ConfigTable::new())
		.unwrap();
		assert_eq!(context.get("batch"), Some(DEFAULT_BATCH));
		assert_eq!(context.get("cluster"), Some("ruby"));
		assert!(!context.contains_key("xstartup"));
	}

	#[test]
	fn unknown_batch_is_reported_by_resolver() {
		let (tmp, xstartup) = fixture();
		let err = SessionRequest::build(
			SessionOptions::new(&xstartup).outdir(tmp.path()).batch("quick"),
			&ConfigCatalog::builtin().unwrap(),
		)
		.unwrap_err();
		assert!(matches!(validation(err), ValidationError::UnknownBatchType(ref b) if b == "quick"));
	}

	#[test]
	fn revalidate_notices_removed_xstartup() {
		let (tmp, xstartup) = fixture();
		let request =
			SessionRequest::build(SessionOptions::new(&xstartup).outdir(tmp.path()), &ConfigCatalog::builtin().unwrap()).unwrap();
		std::fs::remove_file(&xstartup).unwrap();
		assert!(request.revalidate().is_err());
	}
}
