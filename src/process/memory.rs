//! Tracee memory access
//!
//! Reads go through `PTRACE_PEEKDATA` one aligned machine word at a time,
//! so a read never touches a word that does not overlap the requested
//! bytes.

use nix::sys::ptrace;
use nix::unistd::Pid;
use tracing::warn;

use crate::tracer::{Result, TraceError};

const WORD: u64 = std::mem::size_of::<libc::c_long>() as u64;

/// Longest string read before giving up on finding the terminator
const MAX_CSTRING: usize = 64 * 1024;

/// Read access to a stopped tracee's address space
pub trait RemoteMemory {
	/// Read a NUL-terminated string starting at `addr`
	///
	/// Invalid UTF-8 is replaced rather than rejected.
	fn read_cstring(&self, addr: u64) -> Result<String>;

	/// Read exactly `len` bytes starting at `addr`
	fn read_buffer(&self, addr: u64, len: usize) -> Result<Vec<u8>>;
}

fn peek_word(pid: Pid, addr: u64) -> Result<[u8; WORD as usize]> {
	ptrace::read(pid, addr as ptrace::AddressType)
		.map(|word| word.to_ne_bytes())
		.map_err(|source| TraceError::ProcessMemory { pid, addr, source })
}

/// Read a NUL-terminated string from `pid` at `addr`
pub fn read_cstring(pid: Pid, addr: u64) -> Result<String> {
	let mut bytes = Vec::new();
	let mut word_addr = addr & !(WORD - 1);
	let mut skip = (addr - word_addr) as usize;

	loop {
		let word = peek_word(pid, word_addr)?;
		for &byte in &word[skip..] {
			if byte == 0 {
				return Ok(String::from_utf8_lossy(&bytes).into_owned());
			}
			bytes.push(byte);
		}

		if bytes.len() >= MAX_CSTRING {
			warn!(%pid, addr, "no terminator within {} bytes, truncating", MAX_CSTRING);
			return Ok(String::from_utf8_lossy(&bytes).into_owned());
		}
		skip = 0;
		word_addr += WORD;
	}
}

/// Read `len` bytes from `pid` at `addr`
pub fn read_buffer(pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>> {
	let mut bytes = Vec::with_capacity(len);
	let mut word_addr = addr & !(WORD - 1);
	let mut skip = (addr - word_addr) as usize;

	while bytes.len() < len {
		let word = peek_word(pid, word_addr)?;
		let take = (word.len() - skip).min(len - bytes.len());
		bytes.extend_from_slice(&word[skip..skip + take]);
		skip = 0;
		word_addr += WORD;
	}

	Ok(bytes)
}
