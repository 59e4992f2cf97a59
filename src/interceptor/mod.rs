//! Syscall interceptors
//!
//! An interceptor observes every syscall stop of the tracee: `before` runs
//! while the tracee is stopped at syscall entry, `after` while it is
//! stopped at syscall exit. Interceptors reach the tracee only through
//! [`InterceptContext`], which offers memory reads and the shared
//! descriptor registry.

mod proxy;
mod tracking;
mod writer;

pub use proxy::RangeProxy;
pub use tracking::DescriptorTracker;
pub use writer::TraceWriter;

use crate::process::RemoteMemory;
use crate::registry::FileDescriptorRegistry;
use crate::syscall::SyscallEvent;
use crate::tracer::{Result, TraceExit};

/// Trait for observing system calls
///
/// Syscalls an interceptor does not care about must be ignored, never
/// reported as errors. Any error returned ends the trace session.
pub trait Interceptor {
	/// Handle a syscall about to execute
	fn before(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()>;

	/// Handle a syscall that just returned
	///
	/// `event.ret` is always set.
	fn after(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()>;

	/// Called once when the tracee is gone
	fn finish(&mut self, _exit: &TraceExit) -> Result<()> {
		Ok(())
	}

	/// Get the name of the interceptor
	///
	/// This is used for debugging and logging purposes.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// What an interceptor may touch while the tracee is stopped
pub struct InterceptContext<'a> {
	memory: &'a dyn RemoteMemory,
	registry: &'a mut FileDescriptorRegistry,
}

impl std::fmt::Debug for InterceptContext<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InterceptContext")
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}

impl<'a> InterceptContext<'a> {
	/// Create a context over a tracee's memory and the session's registry
	pub fn new(memory: &'a dyn RemoteMemory, registry: &'a mut FileDescriptorRegistry) -> Self {
		Self { memory, registry }
	}

	/// Read a NUL-terminated string from the tracee
	pub fn read_cstring(&self, addr: u64) -> Result<String> {
		self.memory.read_cstring(addr)
	}

	/// Read `len` bytes from the tracee
	pub fn read_buffer(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
		self.memory.read_buffer(addr, len)
	}

	/// The path `fd` was opened with, if known
	#[must_use]
	pub fn path_for(&self, fd: i32) -> Option<&str> {
		self.registry.path_for(fd)
	}

	/// The lowest descriptor opened with `path`, if any
	#[must_use]
	pub fn fd_for(&self, path: &str) -> Option<i32> {
		self.registry.fd_for(path)
	}

	/// Mutable access to the descriptor registry
	pub fn registry_mut(&mut self) -> &mut FileDescriptorRegistry {
		&mut *self.registry
	}
}
