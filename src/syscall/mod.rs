//! Syscall-related types and functionality
//!
//! This module contains the syscall table of the build target, the portable
//! [`SyscallEvent`] record, and the per-architecture register decoders that
//! produce it.

mod abi;
mod table;
mod types;

pub use abi::{Aarch64, Aarch64Registers, NativeAbi, SyscallAbi, X86_64, X86_64Registers};
pub use table::{Syscall, syscall_from_number, syscall_name};
pub use types::{Phase, SyscallArgs, SyscallEvent};
