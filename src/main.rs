//! rangetrace traces the system calls of a program and can serve one of
//! its files from an HTTP server, fetching only the bytes it reads.
//!
//! # Usage
//!
//! ```bash
//! rangetrace --file /tmp/big.bin --url http://host/big.bin tail -c 100 /tmp/big.bin
//! ```

use std::io::Write;
use std::process::{Command, ExitCode};
use std::time::Duration;

use clap::Parser;
use rangetrace::tracer::SessionStats;
use rangetrace::util::{init_logging, log_level};
use rangetrace::{ProxyConfig, TraceError, TracerBuilder, TracerConfig};
use tracing::{debug, error};

const NAME: &str = "rangetrace";

#[derive(Parser, Debug)]
#[command(
	author,
	name = NAME,
	version,
	about = "Trace system calls, serving one file from a remote HTTP resource"
)]
struct Cli {
	#[arg(
		required = true,
		trailing_var_arg = true,
		allow_hyphen_values = true,
		help = "Program to trace and its arguments, e.g. 'cat /tmp/data.bin'"
	)]
	args: Vec<String>,

	#[arg(short = 'o', long = "output", help = "send trace output to FILE instead of stderr")]
	output: Option<String>,

	#[arg(
		long = "file",
		env = "RANGETRACE_FILE",
		default_value = "",
		help = "Local path whose reads are served from --url"
	)]
	file: String,

	#[arg(
		long = "url",
		env = "RANGETRACE_URL",
		default_value = "",
		help = "HTTP resource backing --file; it must support range requests"
	)]
	url: String,

	#[arg(long = "timeout", default_value_t = 5, help = "Timeout in seconds for each HTTP request")]
	timeout: u64,

	#[arg(short = 'q', long = "quiet", help = "Do not print the syscall trace")]
	quiet: bool,

	#[arg(short = 'c', long = "summary", help = "Count calls for each syscall and report a summary on exit")]
	summary: bool,
}

fn print_summary(stats: &SessionStats) {
	let mut counts: Vec<_> = stats.syscall_counts.iter().collect();
	counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

	eprintln!("{:>9} syscall", "calls");
	eprintln!("{:->9} {:-<16}", "", "");
	for (name, count) in counts {
		eprintln!("{count:>9} {name}");
	}
	eprintln!("{:->9} {:-<16}", "", "");
	eprintln!("{:>9} total", stats.entries);
}

fn run(cli: Cli) -> Result<i32, TraceError> {
	let config = TracerConfig {
		trace: !cli.quiet,
		proxy: ProxyConfig::new(cli.file, cli.url).with_timeout(Duration::from_secs(cli.timeout)),
	};
	let mut builder = TracerBuilder::with_config(config);
	if let Some(path) = cli.output {
		builder = builder.output_file(path)?;
	}

	let (program, args) = cli.args.split_first().ok_or_else(|| TraceError::Setup("no program given".into()))?;
	let mut command = Command::new(program);
	command.args(args);

	let mut session = builder.build()?.spawn(command)?;
	let exit = session.run()?;
	if cli.summary {
		print_summary(session.stats());
	}
	Ok(exit.code())
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_logging();
	debug!(level = log_level(), ?cli, "starting");

	match run(cli) {
		Ok(code) => ExitCode::from(code as u8),
		Err(err) => {
			error!("{err}");
			let _ = writeln!(std::io::stderr(), "{NAME}: {err}");
			ExitCode::FAILURE
		},
	}
}
