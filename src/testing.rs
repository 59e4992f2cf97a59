//! Fakes shared by unit tests

use std::collections::BTreeMap;

use nix::errno::Errno;
use nix::unistd::Pid;

use crate::process::RemoteMemory;
use crate::tracer::{Result, TraceError};

/// Tracee memory made of a few byte regions
#[derive(Debug, Default)]
pub(crate) struct FakeMemory {
	regions: BTreeMap<u64, Vec<u8>>,
}

impl FakeMemory {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn with_bytes(mut self, addr: u64, bytes: &[u8]) -> Self {
		self.regions.insert(addr, bytes.to_vec());
		self
	}

	pub(crate) fn with_string(self, addr: u64, text: &str) -> Self {
		let mut bytes = text.as_bytes().to_vec();
		bytes.push(0);
		self.with_bytes(addr, &bytes)
	}

	fn region(&self, addr: u64) -> Result<&[u8]> {
		self.regions
			.range(..=addr)
			.next_back()
			.and_then(|(start, bytes)| bytes.get((addr - start) as usize..))
			.filter(|bytes| !bytes.is_empty())
			.ok_or(TraceError::ProcessMemory {
				pid: Pid::from_raw(1),
				addr,
				source: Errno::EIO,
			})
	}
}

impl RemoteMemory for FakeMemory {
	fn read_cstring(&self, addr: u64) -> Result<String> {
		let bytes = self.region(addr)?;
		let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
		Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
	}

	fn read_buffer(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
		if len == 0 {
			return Ok(Vec::new());
		}
		let bytes = self.region(addr)?;
		bytes.get(..len).map(<[u8]>::to_vec).ok_or(TraceError::ProcessMemory {
			pid: Pid::from_raw(1),
			addr: addr + bytes.len() as u64,
			source: Errno::EIO,
		})
	}
}
