//! Tracer functionality
//!
//! This module contains the machinery for building a tracer, starting a
//! process under it and driving the resulting session to completion.

mod builder;
mod error;
mod pipeline;
mod session;

pub use builder::{DEFAULT_TIMEOUT, ProxyConfig, TracerBuilder, TracerConfig};
pub use error::{ErrorKind, Result, TraceError};
pub use pipeline::Pipeline;
pub use session::{SessionStats, TraceExit, TraceSession};

use std::ffi::OsStr;
use std::process::Command;

use crate::process::PtraceProcess;

/// A configured tracer
///
/// This struct is created using the `TracerBuilder`. It holds the
/// interceptor pipeline until a process is started with it.
#[derive(Debug)]
pub struct Tracer {
	/// The configuration the tracer was built from
	config: TracerConfig,
	/// The interceptors for the session
	pipeline: Pipeline,
}

impl Tracer {
	/// Create a new tracer
	///
	/// This is typically called by the `TracerBuilder` and not directly.
	pub(crate) const fn new(config: TracerConfig, pipeline: Pipeline) -> Self {
		Self { config, pipeline }
	}

	/// Get the tracer configuration
	#[must_use]
	pub const fn config(&self) -> &TracerConfig {
		&self.config
	}

	/// Get the interceptor pipeline
	#[must_use]
	pub const fn pipeline(&self) -> &Pipeline {
		&self.pipeline
	}

	/// Start `command` under trace
	///
	/// The returned session has not run yet; standard streams the command
	/// was set up to pipe can be taken from the tracee first.
	pub fn spawn(self, command: Command) -> Result<TraceSession<PtraceProcess>> {
		let process = PtraceProcess::spawn(command)?;
		Ok(TraceSession::new(process, self.pipeline))
	}

	/// Run `program` with `args` under trace until it is gone
	pub fn run<I, S>(self, program: impl AsRef<OsStr>, args: I) -> Result<TraceExit>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		let mut command = Command::new(program);
		command.args(args);
		self.spawn(command)?.run()
	}
}
