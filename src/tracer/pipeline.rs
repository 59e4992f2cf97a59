//! Ordered interceptor dispatch

use tracing::error;

use crate::interceptor::{InterceptContext, Interceptor};
use crate::syscall::{Phase, SyscallEvent};
use crate::tracer::{Result, TraceExit};

/// The interceptors of a session, called in insertion order
#[derive(Default)]
pub struct Pipeline {
	interceptors: Vec<Box<dyn Interceptor>>,
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list().entries(self.names()).finish()
	}
}

impl Pipeline {
	/// Create an empty pipeline
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Append an interceptor
	pub fn push<I: Interceptor + 'static>(&mut self, interceptor: I) {
		self.push_boxed(Box::new(interceptor));
	}

	/// Append an already boxed interceptor
	pub fn push_boxed(&mut self, interceptor: Box<dyn Interceptor>) {
		self.interceptors.push(interceptor);
	}

	/// Number of interceptors
	#[must_use]
	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	/// Whether the pipeline has no interceptors
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}

	/// Interceptor names, in dispatch order
	#[must_use]
	pub fn names(&self) -> Vec<&'static str> {
		self.interceptors.iter().map(|interceptor| interceptor.name()).collect()
	}

	/// Hand `event` to every interceptor for `phase`
	///
	/// Stops at the first failure, which is returned tagged with the
	/// syscall and phase.
	pub fn dispatch(&mut self, phase: Phase, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		for interceptor in &mut self.interceptors {
			let result = match phase {
				Phase::AboutToRun => interceptor.before(event, ctx),
				Phase::JustReturned => interceptor.after(event, ctx),
			};
			if let Err(err) = result {
				error!(interceptor = interceptor.name(), syscall = %event.name(), %phase, "{err}");
				return Err(err.during(event.name(), phase));
			}
		}
		Ok(())
	}

	/// Tell every interceptor the tracee is gone
	///
	/// All interceptors are finished even if one fails; the first error is
	/// returned.
	pub fn finish(&mut self, exit: &TraceExit) -> Result<()> {
		let mut first = None;
		for interceptor in &mut self.interceptors {
			if let Err(err) = interceptor.finish(exit) {
				error!(interceptor = interceptor.name(), "finish failed: {err}");
				first.get_or_insert(err);
			}
		}
		first.map_or(Ok(()), Err)
	}
}
