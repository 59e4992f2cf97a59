//! Error types for the tracer
//!
//! This module contains error types and a result type for tracing
//! sessions. Every error is fatal to the session that raised it.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::syscall::Phase;

/// Result type for tracer operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Error type for tracer operations
#[derive(Debug, Error)]
pub enum TraceError {
	/// The tracee could not be started
	#[error("Failed to spawn tracee `{program}`: {source}")]
	Spawn {
		/// Program that was being started
		program: String,
		/// Underlying error
		#[source]
		source: io::Error,
	},

	/// The tracee did not reach the expected initial stop
	#[error("Tracee setup failed: {0}")]
	Setup(String),

	/// The registers of a stopped tracee could not be read
	#[error("Failed to read registers of {pid}: {source}")]
	RegisterRead {
		/// Tracee
		pid: Pid,
		/// Underlying error
		#[source]
		source: Errno,
	},

	/// Tracee memory could not be read
	#[error("Failed to read memory of {pid} at {addr:#x}: {source}")]
	ProcessMemory {
		/// Tracee
		pid: Pid,
		/// Address that failed
		addr: u64,
		/// Underlying error
		#[source]
		source: Errno,
	},

	/// The tracee could not be resumed
	#[error("Failed to resume {pid}: {source}")]
	Resume {
		/// Tracee
		pid: Pid,
		/// Underlying error
		#[source]
		source: Errno,
	},

	/// Waiting for the tracee failed
	#[error("Failed to wait for {pid}: {source}")]
	Wait {
		/// Tracee
		pid: Pid,
		/// Underlying error
		#[source]
		source: Errno,
	},

	/// The remote resource cannot be introspected or ranged
	#[error("Unusable remote resource {url}: {reason}")]
	RemoteMetadata {
		/// Resource URL
		url: String,
		/// What was wrong
		reason: String,
	},

	/// A ranged fetch failed
	#[error("Range request to {url} failed: {reason}")]
	RemoteFetch {
		/// Resource URL
		url: String,
		/// What was wrong
		reason: String,
	},

	/// The backing file could not be created or written
	#[error("Backing file {}: {source}", .path.display())]
	LocalFile {
		/// Backing file path
		path: PathBuf,
		/// Underlying error
		#[source]
		source: io::Error,
	},

	/// A syscall carried an argument outside of its contract
	#[error("Protocol violation: {0}")]
	ProtocolViolation(String),

	/// The trace output could not be written
	#[error("Failed to write trace output: {0}")]
	Output(#[from] io::Error),

	/// An interceptor failed while handling a syscall
	#[error("{syscall} ({phase}): {source}")]
	Syscall {
		/// Syscall name
		syscall: String,
		/// Side of the syscall being handled
		phase: Phase,
		/// The interceptor's error
		#[source]
		source: Box<TraceError>,
	},
}

/// Flat classification of [`TraceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ErrorKind {
	Spawn,
	Setup,
	RegisterReadFailure,
	ProcessMemoryError,
	ResumeFailure,
	WaitFailure,
	RemoteMetadataError,
	RemoteFetchError,
	LocalFileError,
	ProtocolViolation,
	Output,
}

impl TraceError {
	/// The kind of this error, looking through syscall context
	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Spawn { .. } => ErrorKind::Spawn,
			Self::Setup(_) => ErrorKind::Setup,
			Self::RegisterRead { .. } => ErrorKind::RegisterReadFailure,
			Self::ProcessMemory { .. } => ErrorKind::ProcessMemoryError,
			Self::Resume { .. } => ErrorKind::ResumeFailure,
			Self::Wait { .. } => ErrorKind::WaitFailure,
			Self::RemoteMetadata { .. } => ErrorKind::RemoteMetadataError,
			Self::RemoteFetch { .. } => ErrorKind::RemoteFetchError,
			Self::LocalFile { .. } => ErrorKind::LocalFileError,
			Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
			Self::Output(_) => ErrorKind::Output,
			Self::Syscall { source, .. } => source.kind(),
		}
	}

	/// Name of the syscall being handled when the error was raised
	#[must_use]
	pub fn syscall(&self) -> Option<&str> {
		match self {
			Self::Syscall { syscall, .. } => Some(syscall),
			_ => None,
		}
	}

	/// Wrap this error with the syscall that triggered it
	#[must_use]
	pub fn during(self, syscall: impl Into<String>, phase: Phase) -> Self {
		Self::Syscall {
			syscall: syscall.into(),
			phase,
			source: Box::new(self),
		}
	}
}
