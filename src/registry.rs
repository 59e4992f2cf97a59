//! File descriptor bookkeeping
//!
//! The tracer never asks the kernel what a descriptor refers to. It learns
//! it from the syscalls it observes: successful opens enter a path, `close`
//! removes it and the dup family copies it.

use std::collections::BTreeMap;

/// Mapping between the tracee's open descriptors and the paths that
/// opened them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileDescriptorRegistry {
	paths: BTreeMap<i32, String>,
}

impl FileDescriptorRegistry {
	/// Create an empty registry
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Map `fd` to `path`, replacing any previous mapping
	pub fn record(&mut self, fd: i32, path: impl Into<String>) {
		self.paths.insert(fd, path.into());
	}

	/// The path `fd` was opened with
	#[must_use]
	pub fn path_for(&self, fd: i32) -> Option<&str> {
		self.paths.get(&fd).map(String::as_str)
	}

	/// The lowest descriptor currently mapped to exactly `path`
	#[must_use]
	pub fn fd_for(&self, path: &str) -> Option<i32> {
		self.paths.iter().find(|(_, p)| p.as_str() == path).map(|(&fd, _)| fd)
	}

	/// Drop the mapping of a closed descriptor
	pub fn forget(&mut self, fd: i32) -> Option<String> {
		self.paths.remove(&fd)
	}

	/// Make `to` refer to whatever `from` refers to
	///
	/// If `from` is unknown, `to` becomes unknown too: whatever it referred
	/// to before was closed by the duplication.
	pub fn duplicate(&mut self, from: i32, to: i32) {
		match self.paths.get(&from).cloned() {
			Some(path) => {
				self.paths.insert(to, path);
			},
			None => {
				self.paths.remove(&to);
			},
		}
	}

	/// Number of known descriptors
	#[must_use]
	pub fn len(&self) -> usize {
		self.paths.len()
	}

	/// Whether no descriptor is known
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.paths.is_empty()
	}
}
