use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_submit_with_defaults() {
	let cli = Cli::try_parse_from(["vnc", "submit", "xstartup.sh"]).unwrap();

	assert_eq!(cli.format, OutputFormat::Text);
	match cli.command {
		Commands::Submit(args) => {
			assert_eq!(args.xstartup, PathBuf::from("xstartup.sh"));
			assert_eq!(args.qsub, PathBuf::from("qsub"));
			assert_eq!(args.conn_format, ConnFormat::Text);
			assert_eq!(args.listen_timeout(), Duration::from_secs(30));
			assert_eq!(args.poll_timeout(), Duration::from_secs(120));
			assert_eq!(args.poll_interval(), Duration::from_secs(5));
			assert!(args.config.batch.is_none());
			assert!(!args.no_record);
		}
		_ => panic!("Expected Submit command"),
	}
}

#[test]
fn parse_submit_with_overrides() {
	let cli = Cli::try_parse_from([
		"vnc",
		"-f",
		"json",
		"submit",
		"xstartup.sh",
		"-c",
		"oakley",
		"-w",
		"01:00:00",
		"--set",
		"geometry=800x600",
		"--set",
		"dpi=120",
		"-l",
		"nodes=1:ppn=12",
		"--header",
		"Job_Name=mysession",
		"-e",
		"FOO=a=b",
		"--conn-format",
		"url",
		"--poll-interval-ms",
		"250",
	])
	.unwrap();

	assert_eq!(cli.format, OutputFormat::Json);
	match cli.command {
		Commands::Submit(args) => {
			assert_eq!(args.config.cluster.as_deref(), Some("oakley"));
			assert_eq!(args.walltime.as_deref(), Some("01:00:00"));
			assert_eq!(
				args.config.set,
				[("geometry".to_string(), "800x600".to_string()), ("dpi".to_string(), "120".to_string())]
			);
			assert_eq!(args.resources, [("nodes".to_string(), "1:ppn=12".to_string())]);
			assert_eq!(args.headers, [("Job_Name".to_string(), "mysession".to_string())]);
			assert_eq!(args.envvars, [("FOO".to_string(), "a=b".to_string())]);
			assert_eq!(args.conn_format, ConnFormat::Url);
			assert_eq!(args.poll_interval(), Duration::from_millis(250));
		}
		_ => panic!("Expected Submit command"),
	}
}

#[test]
fn key_value_requires_equals_and_key() {
	assert!(Cli::try_parse_from(["vnc", "resolve", "--set", "geometry"]).is_err());
	assert!(Cli::try_parse_from(["vnc", "resolve", "--set", "=1"]).is_err());
}

#[test]
fn parse_resolve_session_flags() {
	let cli = Cli::try_parse_from([
		"vnc",
		"resolve",
		"-c",
		"ruby",
		"--xstartup",
		"/home/u/xstartup",
		"-o",
		"/tmp/out",
		"-w",
		"02:00:00",
	])
	.unwrap();
	match cli.command {
		Commands::Resolve(args) => {
			assert_eq!(args.config.cluster.as_deref(), Some("ruby"));
			assert_eq!(args.xstartup, Some(PathBuf::from("/home/u/xstartup")));
			assert_eq!(args.outdir, Some(PathBuf::from("/tmp/out")));
			assert_eq!(args.walltime.as_deref(), Some("02:00:00"));
		}
		_ => panic!("Expected Resolve command"),
	}
}

#[test]
fn parse_conn() {
	let cli = Cli::try_parse_from(["vnc", "conn", "42.batch", "-o", "/tmp/out", "--conn-format", "jnlp"]).unwrap();
	match cli.command {
		Commands::Conn(args) => {
			assert_eq!(args.job_id, "42.batch");
			assert_eq!(args.outdir, Some(PathBuf::from("/tmp/out")));
			assert_eq!(args.conn_format, ConnFormat::Jnlp);
		}
		_ => panic!("Expected Conn command"),
	}
}

#[test]
fn unknown_conn_format_is_rejected() {
	assert!(Cli::try_parse_from(["vnc", "conn", "42", "--conn-format", "vnc"]).is_err());
}
