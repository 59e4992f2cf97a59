//! The trace control loop
//!
//! A session alternates between syscall-entry and syscall-exit stops of
//! one tracee. The tracee starts stopped just after its initial `execve`
//! returned, so the session starts in [`Phase::JustReturned`] and the first
//! dispatched event is the exit half of that `execve`.

use std::collections::BTreeMap;
use std::fmt;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::{debug, info, trace};

use crate::interceptor::InterceptContext;
use crate::process::{PtraceProcess, Tracee};
use crate::registry::FileDescriptorRegistry;
use crate::syscall::{Phase, SyscallAbi};
use crate::tracer::{Pipeline, Result};

/// How the tracee ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceExit {
	/// Exited with a status code
	Exited(i32),
	/// Killed by a signal
	Signaled(Signal),
}

impl TraceExit {
	/// Exit status in shell convention, `128 + signal` for a killed tracee
	#[must_use]
	pub fn code(&self) -> i32 {
		match self {
			Self::Exited(code) => *code,
			Self::Signaled(signal) => 128 + *signal as i32,
		}
	}
}

impl fmt::Display for TraceExit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Exited(code) => write!(f, "exited with {code}"),
			Self::Signaled(signal) => write!(f, "killed by {signal}"),
		}
	}
}

/// Statistics about a session
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
	/// Syscall-entry stops seen
	pub entries: usize,
	/// Syscall-exit stops seen
	pub exits: usize,
	/// Signals passed on to the tracee
	pub signals_forwarded: usize,
	/// Entry count of each syscall, by name
	pub syscall_counts: BTreeMap<String, usize>,
}

impl SessionStats {
	fn record(&mut self, phase: Phase, name: &str) {
		match phase {
			Phase::AboutToRun => {
				self.entries += 1;
				*self.syscall_counts.entry(name.to_string()).or_insert(0) += 1;
			},
			Phase::JustReturned => self.exits += 1,
		}
	}
}

/// A running trace of one process
pub struct TraceSession<T: Tracee = PtraceProcess> {
	tracee: T,
	phase: Phase,
	pipeline: Pipeline,
	registry: FileDescriptorRegistry,
	stats: SessionStats,
}

impl<T: Tracee + fmt::Debug> fmt::Debug for TraceSession<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TraceSession")
			.field("tracee", &self.tracee)
			.field("phase", &self.phase)
			.field("pipeline", &self.pipeline)
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}

impl<T: Tracee> TraceSession<T> {
	/// Drive `tracee`, which must be stopped right after `execve` returned
	pub fn new(tracee: T, pipeline: Pipeline) -> Self {
		Self {
			tracee,
			phase: Phase::JustReturned,
			pipeline,
			registry: FileDescriptorRegistry::new(),
			stats: SessionStats::default(),
		}
	}

	/// Process id of the tracee
	#[must_use]
	pub fn pid(&self) -> Pid {
		self.tracee.pid()
	}

	/// Side of the syscall the tracee is stopped at
	#[must_use]
	pub const fn phase(&self) -> Phase {
		self.phase
	}

	/// The descriptor registry
	#[must_use]
	pub const fn registry(&self) -> &FileDescriptorRegistry {
		&self.registry
	}

	/// Statistics so far
	#[must_use]
	pub const fn stats(&self) -> &SessionStats {
		&self.stats
	}

	/// The tracee
	pub fn tracee_mut(&mut self) -> &mut T {
		&mut self.tracee
	}

	/// Trace until the tracee is gone
	///
	/// Any error ends the session; the tracee is left to its `Drop`.
	pub fn run(&mut self) -> Result<TraceExit> {
		let pid = self.tracee.pid();
		info!(%pid, abi = T::Abi::NAME, "tracing");

		loop {
			self.dispatch()?;
			if let Some(exit) = self.advance()? {
				info!(%pid, "tracee {exit}");
				self.pipeline.finish(&exit)?;
				return Ok(exit);
			}
			self.phase = self.phase.flip();
		}
	}

	/// Decode the current stop and hand it to the pipeline
	fn dispatch(&mut self) -> Result<()> {
		let regs = self.tracee.registers()?;
		let event = T::Abi::decode(&regs, self.phase);
		trace!(phase = %self.phase, syscall = %event.name(), ?event, "syscall stop");
		self.stats.record(self.phase, &event.name());

		let mut ctx = InterceptContext::new(&self.tracee, &mut self.registry);
		self.pipeline.dispatch(self.phase, &event, &mut ctx)
	}

	/// Resume until the next syscall stop
	///
	/// Returns how the tracee ended if it is gone instead. Other stops are
	/// absorbed here, so they neither flip the phase nor reach the pipeline.
	fn advance(&mut self) -> Result<Option<TraceExit>> {
		let mut pending = None;
		loop {
			self.tracee.resume(pending.take())?;
			match self.tracee.wait()? {
				WaitStatus::PtraceSyscall(_) => return Ok(None),
				WaitStatus::Exited(_, code) => return Ok(Some(TraceExit::Exited(code))),
				WaitStatus::Signaled(_, signal, _) => return Ok(Some(TraceExit::Signaled(signal))),
				WaitStatus::Stopped(_, Signal::SIGTRAP) => debug!("suppressing SIGTRAP"),
				WaitStatus::Stopped(_, signal) => {
					debug!(%signal, "forwarding signal");
					self.stats.signals_forwarded += 1;
					pending = Some(signal);
				},
				WaitStatus::PtraceEvent(_, _, event) => debug!(event, "ptrace event stop"),
				WaitStatus::Continued(_) | WaitStatus::StillAlive => {},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::collections::VecDeque;
	use std::rc::Rc;

	use super::*;
	use crate::interceptor::Interceptor;
	use crate::process::RemoteMemory;
	use crate::syscall::{Syscall, SyscallEvent, X86_64, X86_64Registers};
	use crate::tracer::{ErrorKind, TraceError};

	const PID: i32 = 4242;

	/// A tracee that replays a fixed sequence of stops
	#[derive(Debug, Default)]
	struct ScriptedTracee {
		/// Register snapshot for each dispatched stop
		registers: RefCell<VecDeque<X86_64Registers>>,
		/// Status returned by each wait
		statuses: VecDeque<WaitStatus>,
		/// Signal passed to each resume
		resumed: Vec<Option<Signal>>,
	}

	impl ScriptedTracee {
		fn stop(&mut self, number: u64, ret: u64) -> &mut Self {
			let regs = X86_64Registers {
				orig_rax: number,
				rax: ret,
				..X86_64Registers::default()
			};
			self.registers.borrow_mut().push_back(regs);
			self
		}

		fn then(&mut self, status: WaitStatus) -> &mut Self {
			self.statuses.push_back(status);
			self
		}
	}

	impl RemoteMemory for ScriptedTracee {
		fn read_cstring(&self, addr: u64) -> Result<String> {
			Err(TraceError::ProcessMemory {
				pid: Pid::from_raw(PID),
				addr,
				source: nix::errno::Errno::EIO,
			})
		}

		fn read_buffer(&self, addr: u64, _len: usize) -> Result<Vec<u8>> {
			self.read_cstring(addr).map(String::into_bytes)
		}
	}

	impl Tracee for ScriptedTracee {
		type Abi = X86_64;

		fn pid(&self) -> Pid {
			Pid::from_raw(PID)
		}

		fn registers(&self) -> Result<X86_64Registers> {
			self.registers.borrow_mut().pop_front().ok_or(TraceError::RegisterRead {
				pid: self.pid(),
				source: nix::errno::Errno::ESRCH,
			})
		}

		fn resume(&mut self, signal: Option<Signal>) -> Result<()> {
			self.resumed.push(signal);
			Ok(())
		}

		fn wait(&mut self) -> Result<WaitStatus> {
			self.statuses.pop_front().ok_or(TraceError::Wait {
				pid: self.pid(),
				source: nix::errno::Errno::ECHILD,
			})
		}
	}

	type Seen = Rc<RefCell<Vec<(Phase, i64, Option<i64>)>>>;

	struct Spy(Seen);

	impl Interceptor for Spy {
		fn before(&mut self, event: &SyscallEvent, _ctx: &mut InterceptContext<'_>) -> Result<()> {
			self.0.borrow_mut().push((Phase::AboutToRun, event.number, event.ret));
			Ok(())
		}

		fn after(&mut self, event: &SyscallEvent, _ctx: &mut InterceptContext<'_>) -> Result<()> {
			self.0.borrow_mut().push((Phase::JustReturned, event.number, event.ret));
			Ok(())
		}
	}

	fn session(tracee: ScriptedTracee) -> (TraceSession<ScriptedTracee>, Seen) {
		let seen = Seen::default();
		let mut pipeline = Pipeline::new();
		pipeline.push(Spy(Rc::clone(&seen)));
		(TraceSession::new(tracee, pipeline), seen)
	}

	fn syscall_stop() -> WaitStatus {
		WaitStatus::PtraceSyscall(Pid::from_raw(PID))
	}

	const EXECVE: u64 = 59;
	const GETPID: u64 = 39;
	const EXIT_GROUP: u64 = 231;

	#[test]
	fn test_phases_alternate_from_exec_exit() {
		let mut tracee = ScriptedTracee::default();
		tracee
			.stop(EXECVE, 0)
			.then(syscall_stop())
			.stop(GETPID, 0)
			.then(syscall_stop())
			.stop(GETPID, PID as u64)
			.then(syscall_stop())
			.stop(EXIT_GROUP, 0)
			.then(WaitStatus::Exited(Pid::from_raw(PID), 3));

		let (mut session, seen) = session(tracee);
		assert_eq!(session.phase(), Phase::JustReturned);
		let exit = session.run().unwrap();

		assert_eq!(exit, TraceExit::Exited(3));
		assert_eq!(*seen.borrow(), vec![
			(Phase::JustReturned, EXECVE as i64, Some(0)),
			(Phase::AboutToRun, GETPID as i64, None),
			(Phase::JustReturned, GETPID as i64, Some(i64::from(PID))),
			(Phase::AboutToRun, EXIT_GROUP as i64, None),
		]);
		assert_eq!(session.stats().entries, 2);
		assert_eq!(session.stats().exits, 2);
		assert_eq!(session.tracee_mut().resumed, vec![None; 4]);
	}

	#[test]
	fn test_signal_stops_do_not_flip_phase() {
		let pid = Pid::from_raw(PID);
		let mut tracee = ScriptedTracee::default();
		tracee
			.stop(EXECVE, 0)
			.then(WaitStatus::Stopped(pid, Signal::SIGCHLD))
			.then(WaitStatus::Stopped(pid, Signal::SIGTRAP))
			.then(WaitStatus::PtraceEvent(pid, Signal::SIGTRAP, libc::PTRACE_EVENT_EXEC))
			.then(syscall_stop())
			.stop(GETPID, 0)
			.then(WaitStatus::Signaled(pid, Signal::SIGKILL, false));

		let (mut session, seen) = session(tracee);
		let exit = session.run().unwrap();

		assert_eq!(exit, TraceExit::Signaled(Signal::SIGKILL));
		assert_eq!(exit.code(), 137);
		assert_eq!(*seen.borrow(), vec![
			(Phase::JustReturned, EXECVE as i64, Some(0)),
			(Phase::AboutToRun, GETPID as i64, None),
		]);
		// SIGCHLD goes out with the resume after its stop, SIGTRAP does not
		assert_eq!(session.tracee_mut().resumed, vec![
			None,
			Some(Signal::SIGCHLD),
			None,
			None,
			None,
		]);
		assert_eq!(session.stats().signals_forwarded, 1);
	}

	#[test]
	fn test_lost_tracee_is_fatal() {
		let mut tracee = ScriptedTracee::default();
		tracee.stop(EXECVE, 0).then(syscall_stop());

		let (mut session, _) = session(tracee);
		let err = session.run().unwrap_err();
		assert_eq!(err.kind(), ErrorKind::RegisterReadFailure);
	}

	#[test]
	fn test_interceptor_failure_names_syscall() {
		struct Refuse;

		impl Interceptor for Refuse {
			fn before(&mut self, _event: &SyscallEvent, _ctx: &mut InterceptContext<'_>) -> Result<()> {
				Err(TraceError::ProtocolViolation("no".into()))
			}

			fn after(&mut self, _event: &SyscallEvent, _ctx: &mut InterceptContext<'_>) -> Result<()> {
				Ok(())
			}
		}

		let mut tracee = ScriptedTracee::default();
		tracee.stop(EXECVE, 0).then(syscall_stop()).stop(GETPID, 0);
		let mut pipeline = Pipeline::new();
		pipeline.push(Refuse);

		let err = TraceSession::new(tracee, pipeline).run().unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
		assert_eq!(err.syscall(), Some(Syscall::from_number(GETPID as i64).map_or("_39_", |s| s.name())));
	}
}
