//! Register decoding
//!
//! Every supported instruction set stores syscall state in its own register
//! layout. [`SyscallAbi`] projects a raw snapshot onto a portable
//! [`SyscallEvent`]; the implementation matching the build target is
//! exported as [`NativeAbi`].
//!
//! From syscall(2):
//!
//! ```text
//! Arch/ABI    arg1  arg2  arg3  arg4  arg5  arg6   nr    ret
//! x86-64      rdi   rsi   rdx   r10   r8    r9     rax   rax
//! arm64       x0    x1    x2    x3    x4    x5     w8    x0
//! ```

use crate::syscall::{Phase, SyscallArgs, SyscallEvent};

/// Syscall calling convention of one instruction set
pub trait SyscallAbi {
	/// Register snapshot, laid out as `PTRACE_GETREGSET(NT_PRSTATUS)` fills it
	type Registers: Copy + Default + std::fmt::Debug;

	/// Architecture name, for diagnostics
	const NAME: &'static str;

	/// The syscall number
	///
	/// Read from a register the kernel does not overwrite with the return
	/// value, so it is valid on both sides of the syscall.
	fn syscall_number(regs: &Self::Registers) -> i64;

	/// The six syscall arguments
	fn arguments(regs: &Self::Registers) -> SyscallArgs;

	/// The return value register
	fn return_value(regs: &Self::Registers) -> i64;

	/// Project a snapshot onto an event
	///
	/// The return value is only attached on the exit side.
	fn decode(regs: &Self::Registers, phase: Phase) -> SyscallEvent {
		let number = Self::syscall_number(regs);
		let args = Self::arguments(regs);
		match phase {
			Phase::AboutToRun => SyscallEvent::entry(number, args),
			Phase::JustReturned => SyscallEvent::exit(number, args, Self::return_value(regs)),
		}
	}
}

/// `struct user_regs_struct` from `<sys/user.h>` on x86_64
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct X86_64Registers {
	pub r15: u64,
	pub r14: u64,
	pub r13: u64,
	pub r12: u64,
	pub rbp: u64,
	pub rbx: u64,
	pub r11: u64,
	pub r10: u64,
	pub r9: u64,
	pub r8: u64,
	pub rax: u64,
	pub rcx: u64,
	pub rdx: u64,
	pub rsi: u64,
	pub rdi: u64,
	pub orig_rax: u64,
	pub rip: u64,
	pub cs: u64,
	pub eflags: u64,
	pub rsp: u64,
	pub ss: u64,
	pub fs_base: u64,
	pub gs_base: u64,
	pub ds: u64,
	pub es: u64,
	pub fs: u64,
	pub gs: u64,
}

/// `struct user_pt_regs` from `<asm/ptrace.h>` on aarch64
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aarch64Registers {
	/// General purpose registers x0-x30
	pub regs: [u64; 31],
	/// Stack pointer
	pub sp: u64,
	/// Program counter
	pub pc: u64,
	/// Processor state
	pub pstate: u64,
}

/// The x86_64 syscall convention
///
/// `rax` carries the number on entry and the return value on exit, so the
/// number is read from `orig_rax`, which the kernel preserves.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64;

impl SyscallAbi for X86_64 {
	type Registers = X86_64Registers;

	const NAME: &'static str = "x86_64";

	fn syscall_number(regs: &Self::Registers) -> i64 {
		regs.orig_rax as i64
	}

	fn arguments(regs: &Self::Registers) -> SyscallArgs {
		SyscallArgs::new(regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9)
	}

	fn return_value(regs: &Self::Registers) -> i64 {
		regs.rax as i64
	}
}

/// The aarch64 syscall convention
///
/// Arguments are the first six general purpose registers and the number
/// sits in `x8`, outside that prefix. `x0` is overwritten by the return
/// value, so the first argument is only meaningful on entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aarch64;

impl SyscallAbi for Aarch64 {
	type Registers = Aarch64Registers;

	const NAME: &'static str = "aarch64";

	fn syscall_number(regs: &Self::Registers) -> i64 {
		regs.regs[8] as i64
	}

	fn arguments(regs: &Self::Registers) -> SyscallArgs {
		let r = &regs.regs;
		SyscallArgs::new(r[0], r[1], r[2], r[3], r[4], r[5])
	}

	fn return_value(regs: &Self::Registers) -> i64 {
		regs.regs[0] as i64
	}
}

/// The convention of the build target
#[cfg(target_arch = "x86_64")]
pub type NativeAbi = X86_64;

/// The convention of the build target
#[cfg(target_arch = "aarch64")]
pub type NativeAbi = Aarch64;
