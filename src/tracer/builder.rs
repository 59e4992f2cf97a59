//! Builder for creating tracers
//!
//! This module contains the `TracerBuilder` struct and the configuration
//! types it fills in.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::interceptor::{Interceptor, RangeProxy, TraceWriter};
use crate::tracer::{Pipeline, Result, Tracer};

/// Timeout applied to every remote request unless configured otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the range proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
	/// Local path whose reads are served from the remote resource
	pub filename: String,
	/// URL of the remote resource
	pub url: String,
	/// Timeout for each remote request
	pub timeout: Duration,
}

impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			filename: String::new(),
			url: String::new(),
			timeout: DEFAULT_TIMEOUT,
		}
	}
}

impl ProxyConfig {
	/// Proxy `filename` from `url`
	#[must_use]
	pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			filename: filename.into(),
			url: url.into(),
			..Self::default()
		}
	}

	/// Use `timeout` for remote requests
	#[must_use]
	pub const fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Whether both a filename and a URL are set
	#[must_use]
	pub fn is_enabled(&self) -> bool {
		!self.filename.is_empty() && !self.url.is_empty()
	}
}

/// Configuration for a tracer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
	/// Whether to write a syscall trace
	pub trace: bool,
	/// Range proxy settings
	pub proxy: ProxyConfig,
}

impl Default for TracerConfig {
	fn default() -> Self {
		Self {
			trace: true,
			proxy: ProxyConfig::default(),
		}
	}
}

/// Builder for creating tracers
///
/// The built-in interceptors come first in the pipeline, in the order range
/// proxy then trace writer, followed by any added with
/// [`TracerBuilder::interceptor`].
pub struct TracerBuilder {
	/// The configuration for the tracer
	config: TracerConfig,
	/// Sink for the trace, stderr when unset
	output: Option<Box<dyn Write>>,
	/// Extra interceptors
	interceptors: Vec<Box<dyn Interceptor>>,
}

impl Default for TracerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for TracerBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TracerBuilder")
			.field("config", &self.config)
			.field("output", &if self.output.is_some() { "custom" } else { "stderr" })
			.field("interceptors", &format!("[{} interceptors]", self.interceptors.len()))
			.finish()
	}
}

impl TracerBuilder {
	/// Create a new tracer builder with default settings
	#[must_use]
	pub fn new() -> Self {
		Self {
			config: TracerConfig::default(),
			output: None,
			interceptors: Vec::new(),
		}
	}

	/// Start from an existing configuration
	#[must_use]
	pub fn with_config(config: TracerConfig) -> Self {
		Self {
			config,
			..Self::new()
		}
	}

	/// Enable or disable the syscall trace
	#[must_use]
	pub const fn trace(mut self, trace: bool) -> Self {
		self.config.trace = trace;
		self
	}

	/// Serve reads of `filename` from `url`
	#[must_use]
	pub fn proxy(mut self, filename: impl Into<String>, url: impl Into<String>) -> Self {
		self.config.proxy = ProxyConfig {
			timeout: self.config.proxy.timeout,
			..ProxyConfig::new(filename, url)
		};
		self
	}

	/// Set the timeout for remote requests
	#[must_use]
	pub const fn timeout(mut self, timeout: Duration) -> Self {
		self.config.proxy.timeout = timeout;
		self
	}

	/// Write the trace to `output` instead of stderr
	#[must_use]
	pub fn output<W: Write + 'static>(mut self, output: W) -> Self {
		self.output = Some(Box::new(output));
		self
	}

	/// Write the trace to a file created at `path`
	///
	/// A file that cannot be created is an [`TraceError::Output`] error.
	///
	/// [`TraceError::Output`]: crate::tracer::TraceError::Output
	pub fn output_file(self, path: impl AsRef<Path>) -> Result<Self> {
		let file = File::create(path)?;
		Ok(self.output(file))
	}

	/// Add an interceptor after the built-in ones
	#[must_use]
	pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
		self.interceptors.push(Box::new(interceptor));
		self
	}

	/// The configuration so far
	#[must_use]
	pub const fn config(&self) -> &TracerConfig {
		&self.config
	}

	/// Build the tracer
	///
	/// When the proxy is enabled this creates the backing file and queries
	/// the remote resource, so configuration problems surface before any
	/// process is started.
	pub fn build(self) -> Result<Tracer> {
		let mut pipeline = Pipeline::new();

		if self.config.proxy.is_enabled() {
			let mut proxy = RangeProxy::from_config(&self.config.proxy)?;
			proxy.resolve_size()?;
			pipeline.push(proxy);
		}

		if self.config.trace {
			let writer = match self.output {
				Some(output) => TraceWriter::new(output),
				None => TraceWriter::stderr(),
			};
			pipeline.push(writer);
		}

		for interceptor in self.interceptors {
			pipeline.push_boxed(interceptor);
		}

		Ok(Tracer::new(self.config, pipeline))
	}
}
