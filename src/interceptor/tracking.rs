//! Descriptor bookkeeping shared by the built-in interceptors

use tracing::{debug, trace};

use super::InterceptContext;
use crate::syscall::{Syscall, SyscallEvent};
use crate::tracer::Result;

/// Argument index of the path for syscalls that open a file
#[must_use]
pub(crate) fn open_path_index(syscall: Syscall) -> Option<usize> {
	match syscall {
		Syscall::openat | Syscall::openat2 => Some(1),
		#[cfg(target_arch = "x86_64")]
		Syscall::open | Syscall::creat => Some(0),
		_ => None,
	}
}

#[derive(Debug, Clone)]
struct Pending {
	entry: SyscallEvent,
	path: Option<String>,
}

/// Keeps the descriptor registry in step with the tracee
///
/// Paths are captured at entry, since the tracee may reuse the buffer
/// before the syscall returns, and committed at exit once the kernel
/// reports success. Entry arguments are kept too: on aarch64 the first
/// argument register holds the return value by the time of the exit stop.
#[derive(Debug, Default)]
pub struct DescriptorTracker {
	pending: Option<Pending>,
}

impl DescriptorTracker {
	/// Create a tracker with nothing pending
	#[must_use]
	pub const fn new() -> Self {
		Self { pending: None }
	}

	/// Remember the entry side of `event`
	///
	/// A path that cannot be read ends the session with a memory error
	/// instead of letting the kernel report `EFAULT`. The tracee is stopped
	/// while the path is read, so a failed read means the tracer has lost
	/// track of it.
	pub fn before(&mut self, event: &SyscallEvent, ctx: &InterceptContext<'_>) -> Result<()> {
		let path = match event.syscall().and_then(open_path_index) {
			Some(index) => {
				let addr = event.args.get(index).unwrap_or_default();
				Some(ctx.read_cstring(addr)?)
			},
			None => None,
		};
		self.pending = Some(Pending {
			entry: *event,
			path,
		});
		Ok(())
	}

	/// Path captured at entry of the syscall in flight
	#[must_use]
	pub fn pending_path(&self) -> Option<&str> {
		self.pending.as_ref().and_then(|pending| pending.path.as_deref())
	}

	/// Entry event of the syscall in flight
	#[must_use]
	pub fn pending_entry(&self) -> Option<&SyscallEvent> {
		self.pending.as_ref().map(|pending| &pending.entry)
	}

	/// Apply the outcome of `event` to the registry
	pub fn after(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		let pending = self
			.pending
			.take()
			.filter(|pending| pending.entry.number == event.number);
		let (Some(syscall), Some(ret)) = (event.syscall(), event.success()) else {
			return Ok(());
		};
		let entry = pending.as_ref().map_or(event, |pending| &pending.entry);
		let ret = ret as i32;

		match syscall {
			Syscall::close => {
				let fd = entry.fd_arg(0);
				if let Some(path) = ctx.registry_mut().forget(fd) {
					trace!(fd, path, "descriptor closed");
				}
			},
			Syscall::dup => ctx.registry_mut().duplicate(entry.fd_arg(0), ret),
			#[cfg(target_arch = "x86_64")]
			Syscall::dup2 => ctx.registry_mut().duplicate(entry.fd_arg(0), ret),
			Syscall::dup3 => ctx.registry_mut().duplicate(entry.fd_arg(0), ret),
			Syscall::fcntl => {
				let cmd = entry.args.arg2 as i32;
				if cmd == libc::F_DUPFD || cmd == libc::F_DUPFD_CLOEXEC {
					ctx.registry_mut().duplicate(entry.fd_arg(0), ret);
				}
			},
			other if open_path_index(other).is_some() => {
				if let Some(path) = pending.as_ref().and_then(|pending| pending.path.clone()) {
					debug!(fd = ret, path, "descriptor opened");
					ctx.registry_mut().record(ret, path);
				}
			},
			_ => {},
		}
		Ok(())
	}
}
