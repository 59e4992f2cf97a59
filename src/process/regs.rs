//! Register snapshots of a stopped tracee

use std::mem;

use nix::errno::Errno;
use nix::unistd::Pid;

/// Fetch the general purpose registers of a stopped tracee
///
/// `PTRACE_GETREGS` does not exist on aarch64, so both architectures go
/// through `PTRACE_GETREGSET` with `NT_PRSTATUS`. `T` must have the exact
/// layout the kernel writes for the target architecture.
pub(crate) fn getregset<T: Default>(pid: Pid) -> Result<T, Errno> {
	let mut regs = T::default();
	let mut iov = libc::iovec {
		iov_base: (&raw mut regs).cast(),
		iov_len: mem::size_of::<T>(),
	};

	// SAFETY: `iov` describes a live, writable buffer of `size_of::<T>()`
	// bytes and the kernel writes at most `iov_len` bytes into it.
	let res = unsafe {
		libc::ptrace(
			libc::PTRACE_GETREGSET,
			pid.as_raw(),
			libc::NT_PRSTATUS as usize as *mut libc::c_void,
			&raw mut iov,
		)
	};
	Errno::result(res)?;

	// The kernel shrinks `iov_len` to what it wrote.
	if iov.iov_len < mem::size_of::<T>() {
		return Err(Errno::EIO);
	}
	Ok(regs)
}
