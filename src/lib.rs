//! rangetrace - A ptrace-based syscall tracer with remote-backed files
//!
//! This crate runs a program under `ptrace`, stops it at every syscall
//! entry and exit and hands each stop to a pipeline of interceptors. Two
//! interceptors ship with it: a [`TraceWriter`] that prints one line per
//! syscall, and a [`RangeProxy`] that makes reads of one local file return
//! bytes fetched on demand from an HTTP resource with range requests.
//!
//! # Getting Started
//!
//! ```rust,no_run
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     rangetrace::util::init_logging();
//!
//!     let exit = rangetrace::new()
//!         .proxy("/tmp/dataset.bin", "http://example.com/dataset.bin")
//!         .build()?
//!         .run("head", ["-c", "64", "/tmp/dataset.bin"])?;
//!
//!     std::process::exit(exit.code());
//! }
//! ```

pub mod interceptor;
pub mod process;
pub mod registry;
pub mod remote;
pub mod syscall;
pub mod tracer;
pub mod util;

#[cfg(test)]
mod testing;

pub use rangetrace_macros::syscall_enum;

pub use interceptor::{InterceptContext, Interceptor, RangeProxy, TraceWriter};
pub use registry::FileDescriptorRegistry;
pub use syscall::{Phase, Syscall, SyscallArgs, SyscallEvent};
pub use tracer::{ErrorKind, ProxyConfig, TraceError, TraceExit, TraceSession, Tracer, TracerBuilder, TracerConfig};

/// Create a new tracer builder
#[must_use]
pub fn new() -> TracerBuilder {
	TracerBuilder::new()
}

/// Shorthand for tracing a command to stderr with default settings
pub fn trace<I, S>(program: &str, args: I) -> Result<TraceExit, TraceError>
where
	I: IntoIterator<Item = S>,
	S: AsRef<std::ffi::OsStr>,
{
	new().build()?.run(program, args)
}
