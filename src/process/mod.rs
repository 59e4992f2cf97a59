//! Traced processes
//!
//! This module contains the [`Tracee`] abstraction the control loop drives,
//! and [`PtraceProcess`], its implementation for a real child process.

mod memory;
mod regs;

pub use memory::{RemoteMemory, read_buffer, read_cstring};

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::syscall::{NativeAbi, SyscallAbi};
use crate::tracer::{Result, TraceError};

/// A stopped-and-resumed process under trace
///
/// The control loop only talks to the traced process through this trait.
pub trait Tracee: RemoteMemory {
	/// Syscall convention of the tracee
	type Abi: SyscallAbi;

	/// Process id of the tracee
	fn pid(&self) -> Pid;

	/// Register snapshot at the current stop
	fn registers(&self) -> Result<<Self::Abi as SyscallAbi>::Registers>;

	/// Resume until the next syscall stop, delivering `signal` if given
	fn resume(&mut self, signal: Option<Signal>) -> Result<()>;

	/// Wait for the next status change
	fn wait(&mut self) -> Result<WaitStatus>;
}

/// A child process started under `ptrace`
#[derive(Debug)]
pub struct PtraceProcess {
	pid: Pid,
	child: Child,
	exited: bool,
}

impl PtraceProcess {
	/// Options set on every tracee
	///
	/// `TRACESYSGOOD` tags syscall stops so they cannot be confused with
	/// signal stops, `TRACEEXEC` turns the post-exec `SIGTRAP` into an event
	/// stop, and `EXITKILL` takes the tracee down with the tracer.
	fn options() -> Options {
		Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_TRACEEXEC | Options::PTRACE_O_EXITKILL
	}

	/// Start `command` traced, stopped right after its `execve` returned
	pub fn spawn(mut command: Command) -> Result<Self> {
		let program = command.get_program().to_string_lossy().into_owned();

		// SAFETY: the hook runs between fork and exec and only issues the
		// PTRACE_TRACEME syscall, which is async-signal-safe.
		unsafe {
			command.pre_exec(|| ptrace::traceme().map_err(io::Error::from));
		}
		let child = command
			.spawn()
			.map_err(|source| TraceError::Spawn { program: program.clone(), source })?;
		let pid = Pid::from_raw(child.id() as i32);
		debug!(%pid, %program, "spawned tracee");

		let mut process = Self {
			pid,
			child,
			exited: false,
		};
		match process.wait()? {
			WaitStatus::Stopped(_, Signal::SIGTRAP) => {},
			other => {
				if matches!(other, WaitStatus::Exited(..) | WaitStatus::Signaled(..)) {
					process.exited = true;
				}
				return Err(TraceError::Setup(format!("expected post-exec SIGTRAP, got {other:?}")));
			},
		}

		ptrace::setoptions(pid, Self::options())
			.map_err(|errno| TraceError::Setup(format!("failed to set ptrace options on {pid}: {errno}")))?;
		debug!(%pid, "tracee is stopped after exec");

		Ok(process)
	}

	/// The child handle, for its piped standard streams
	pub fn child_mut(&mut self) -> &mut Child {
		&mut self.child
	}
}

impl RemoteMemory for PtraceProcess {
	fn read_cstring(&self, addr: u64) -> Result<String> {
		read_cstring(self.pid, addr)
	}

	fn read_buffer(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
		read_buffer(self.pid, addr, len)
	}
}

impl Tracee for PtraceProcess {
	type Abi = NativeAbi;

	fn pid(&self) -> Pid {
		self.pid
	}

	fn registers(&self) -> Result<<NativeAbi as SyscallAbi>::Registers> {
		regs::getregset(self.pid).map_err(|source| TraceError::RegisterRead { pid: self.pid, source })
	}

	fn resume(&mut self, signal: Option<Signal>) -> Result<()> {
		ptrace::syscall(self.pid, signal).map_err(|source| TraceError::Resume { pid: self.pid, source })
	}

	fn wait(&mut self) -> Result<WaitStatus> {
		loop {
			match waitpid(self.pid, None) {
				Ok(status) => {
					if matches!(status, WaitStatus::Exited(..) | WaitStatus::Signaled(..)) {
						self.exited = true;
					}
					return Ok(status);
				},
				Err(Errno::EINTR) => continue,
				Err(source) => return Err(TraceError::Wait { pid: self.pid, source }),
			}
		}
	}
}

impl Drop for PtraceProcess {
	fn drop(&mut self) {
		if self.exited {
			return;
		}
		// An aborted session leaves the tracee stopped; don't leak it.
		warn!(pid = %self.pid, "killing tracee that is still running");
		if kill(self.pid, Signal::SIGKILL).is_ok() {
			let _ = waitpid(self.pid, None);
		}
	}
}
