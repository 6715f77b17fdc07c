use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber. `RUST_LOG` overrides the verbosity count.
pub fn init_logging(verbosity: u8) {
	// 0 = warnings only, so stdout stays the connection payload
	// 1 (-v) = submission and handoff progress
	// 2+ (-vv) = everything, including each poll attempt
	let filter = match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
