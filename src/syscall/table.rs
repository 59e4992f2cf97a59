//! Syscall table
//!
//! This module contains the syscall enum and related functionality.
//! The enum is generated at compile time using the proc macro, from the
//! syscall table of the architecture being built for.

use rangetrace_macros::syscall_enum;
use std::borrow::Cow;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("rangetrace only supports x86_64 and aarch64 targets");

/// Syscall enum
///
/// This enum contains all the Linux syscalls for the x86_64 architecture.
#[cfg(target_arch = "x86_64")]
#[syscall_enum(x86_64)]
pub enum Syscall {}

/// Syscall enum
///
/// This enum contains all the Linux syscalls for the aarch64 architecture.
#[cfg(target_arch = "aarch64")]
#[syscall_enum(aarch64)]
pub enum Syscall {}

/// Get a syscall from its number
#[must_use]
pub fn syscall_from_number(num: i64) -> Option<Syscall> {
	Syscall::from_number(num)
}

/// Name of the syscall with number `num`
///
/// Numbers missing from the table are rendered as `_<num>_`.
#[must_use]
pub fn syscall_name(num: i64) -> Cow<'static, str> {
	match Syscall::from_number(num) {
		Some(syscall) => Cow::Borrowed(syscall.name()),
		None => Cow::Owned(format!("_{num}_")),
	}
}
