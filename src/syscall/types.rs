//! Types for working with syscalls
//!
//! This module contains the portable record of a single syscall stop:
//! the syscall number, its arguments and, on exit, its return value.

use std::borrow::Cow;
use std::fmt;

use nix::errno::Errno;

use crate::syscall::{Syscall, syscall_name};

/// Largest errno the kernel encodes in a return value
const MAX_ERRNO: i64 = 4095;

/// Which side of a syscall the tracee is stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// Stopped before the syscall executes
	AboutToRun,
	/// Stopped after the syscall returned
	JustReturned,
}

impl Phase {
	/// The phase of the following syscall stop
	#[must_use]
	pub const fn flip(self) -> Self {
		match self {
			Self::AboutToRun => Self::JustReturned,
			Self::JustReturned => Self::AboutToRun,
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::AboutToRun => f.write_str("entry"),
			Self::JustReturned => f.write_str("exit"),
		}
	}
}

/// Syscall arguments, in calling-convention order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallArgs {
	/// First argument
	pub arg1: u64,
	/// Second argument
	pub arg2: u64,
	/// Third argument
	pub arg3: u64,
	/// Fourth argument
	pub arg4: u64,
	/// Fifth argument
	pub arg5: u64,
	/// Sixth argument
	pub arg6: u64,
}

impl SyscallArgs {
	/// Create a new `SyscallArgs` struct from individual arguments
	#[must_use]
	pub const fn new(arg1: u64, arg2: u64, arg3: u64, arg4: u64, arg5: u64, arg6: u64) -> Self {
		Self {
			arg1,
			arg2,
			arg3,
			arg4,
			arg5,
			arg6,
		}
	}

	/// Get a specific argument by index (0-5)
	#[must_use]
	pub const fn get(&self, index: usize) -> Option<u64> {
		match index {
			0 => Some(self.arg1),
			1 => Some(self.arg2),
			2 => Some(self.arg3),
			3 => Some(self.arg4),
			4 => Some(self.arg5),
			5 => Some(self.arg6),
			_ => None,
		}
	}

	/// All six arguments as an array
	#[must_use]
	pub const fn to_array(&self) -> [u64; 6] {
		[self.arg1, self.arg2, self.arg3, self.arg4, self.arg5, self.arg6]
	}
}

/// One decoded syscall stop
///
/// Produced fresh by the register decoder at every stop. `ret` is only
/// present for the exit side of a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallEvent {
	/// The raw syscall number
	pub number: i64,
	/// The syscall arguments
	pub args: SyscallArgs,
	/// The return value, on exit only
	pub ret: Option<i64>,
}

impl SyscallEvent {
	/// An event observed before the syscall executes
	#[must_use]
	pub const fn entry(number: i64, args: SyscallArgs) -> Self {
		Self {
			number,
			args,
			ret: None,
		}
	}

	/// An event observed after the syscall returned `ret`
	#[must_use]
	pub const fn exit(number: i64, args: SyscallArgs, ret: i64) -> Self {
		Self {
			number,
			args,
			ret: Some(ret),
		}
	}

	/// The syscall, if its number is in the table
	#[must_use]
	pub fn syscall(&self) -> Option<Syscall> {
		Syscall::from_number(self.number)
	}

	/// Lowercase syscall name, or `_<num>_` when unknown
	#[must_use]
	pub fn name(&self) -> Cow<'static, str> {
		syscall_name(self.number)
	}

	/// Argument `index` (0-5) as a file descriptor
	#[must_use]
	pub fn fd_arg(&self, index: usize) -> i32 {
		self.args.get(index).unwrap_or_default() as i32
	}

	/// The error the syscall failed with, if it returned one
	///
	/// The kernel reports failures as return values in `-4095..=-1`.
	#[must_use]
	pub fn errno(&self) -> Option<Errno> {
		match self.ret {
			Some(ret) if (-MAX_ERRNO..0).contains(&ret) => Some(Errno::from_raw(-ret as i32)),
			_ => None,
		}
	}

	/// The return value of a syscall that completed without error
	#[must_use]
	pub fn success(&self) -> Option<i64> {
		match self.errno() {
			Some(_) => None,
			None => self.ret,
		}
	}
}
