//! Human-readable syscall trace

use std::fmt::Write as _;
use std::io::{self, Write};

use super::{DescriptorTracker, InterceptContext, Interceptor};
use crate::syscall::{Syscall, SyscallEvent};
use crate::tracer::{Result, TraceExit};

/// Longest quoted buffer printed in full
const MAX_QUOTED: usize = 40;

/// Most bytes read from the tracee to render one buffer
const MAX_DUMP: usize = 4096;

/// Writes one line per syscall to a sink
///
/// The entry half of a line is written when the syscall starts, the result
/// when it returns:
///
/// ```text
/// openat(AT_FDCWD, "/tmp/data.bin", 0x0) = 3
/// lseek(3</tmp/data.bin>, -100, SEEK_END) = 900
/// read(3</tmp/data.bin>, 0x7ffd5c1e0a40, 100) = 100 "# rangetrace\nThis "..."tes on demand.\n"
/// close(3</tmp/data.bin>) = 0
/// ```
pub struct TraceWriter<W: Write = Box<dyn Write>> {
	output: W,
	descriptors: DescriptorTracker,
	in_syscall: bool,
}

impl<W: Write> std::fmt::Debug for TraceWriter<W> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TraceWriter")
			.field("in_syscall", &self.in_syscall)
			.finish_non_exhaustive()
	}
}

impl TraceWriter<Box<dyn Write>> {
	/// A writer tracing to stderr
	#[must_use]
	pub fn stderr() -> Self {
		Self::new(Box::new(io::stderr()))
	}
}

impl<W: Write> TraceWriter<W> {
	/// A writer tracing to `output`
	pub fn new(output: W) -> Self {
		Self {
			output,
			descriptors: DescriptorTracker::new(),
			in_syscall: false,
		}
	}

	/// The sink
	pub fn get_ref(&self) -> &W {
		&self.output
	}

	fn entry_text(&self, event: &SyscallEvent, ctx: &InterceptContext<'_>) -> Result<String> {
		let name = event.name();
		let args = &event.args;
		let Some(syscall) = event.syscall() else {
			return Ok(format!("{name}() "));
		};

		let text = match syscall {
			Syscall::getuid | Syscall::geteuid => format!("{name}() "),
			Syscall::openat => format!(
				"{name}({}, {:?}, {:#x}) ",
				dirfd(event.fd_arg(0)),
				self.descriptors.pending_path().unwrap_or_default(),
				args.arg3
			),
			#[cfg(target_arch = "x86_64")]
			Syscall::open | Syscall::creat => format!(
				"{name}({:?}, {:#x}) ",
				self.descriptors.pending_path().unwrap_or_default(),
				args.arg2
			),
			Syscall::openat2 => format!(
				"{name}({}, {:?}, {:#x}, {}) ",
				dirfd(event.fd_arg(0)),
				self.descriptors.pending_path().unwrap_or_default(),
				args.arg3,
				args.arg4
			),
			Syscall::read => format!("{name}({}, {:#x}, {}) ", fd(event.fd_arg(0), ctx), args.arg2, args.arg3),
			Syscall::pread64 => format!(
				"{name}({}, {:#x}, {}, {}) ",
				fd(event.fd_arg(0), ctx),
				args.arg2,
				args.arg3,
				args.arg4 as i64
			),
			Syscall::lseek => format!(
				"{name}({}, {}, {}) ",
				fd(event.fd_arg(0), ctx),
				args.arg2 as i64,
				whence(args.arg3 as i32)
			),
			Syscall::mmap => format!(
				"{name}({:#x}, {}, {:#x}, {:#x}, {}, {:#x}) ",
				args.arg1, args.arg2, args.arg3, args.arg4, args.arg5 as i32, args.arg6
			),
			Syscall::write => {
				let len = args.arg3 as usize;
				let bytes = ctx.read_buffer(args.arg2, len.min(MAX_DUMP))?;
				format!("{name}({}, {}, {len}) ", fd(event.fd_arg(0), ctx), short_string(&bytes))
			},
			Syscall::close => format!("{name}({}) ", fd(event.fd_arg(0), ctx)),
			_ => format!("{name}() "),
		};
		Ok(text)
	}

	fn exit_text(&self, event: &SyscallEvent, ctx: &InterceptContext<'_>) -> Result<String> {
		let ret = event.ret.unwrap_or_default();
		if let Some(errno) = event.errno() {
			return Ok(format!("= -1 {errno:?} ({})", errno.desc()));
		}

		let text = match event.syscall() {
			Some(Syscall::read | Syscall::pread64) if ret > 0 => {
				let bytes = ctx.read_buffer(event.args.arg2, (ret as usize).min(MAX_DUMP))?;
				format!("= {ret} {}", short_string(&bytes))
			},
			Some(Syscall::mmap) => format!("= {ret:#x}"),
			_ => format!("= {ret}"),
		};
		Ok(text)
	}
}

fn fd(fd: i32, ctx: &InterceptContext<'_>) -> String {
	match ctx.path_for(fd) {
		Some(path) => format!("{fd}<{path}>"),
		None => fd.to_string(),
	}
}

fn dirfd(fd: i32) -> String {
	if fd == libc::AT_FDCWD { "AT_FDCWD".to_string() } else { fd.to_string() }
}

fn whence(whence: i32) -> String {
	match whence {
		libc::SEEK_SET => "SEEK_SET".to_string(),
		libc::SEEK_CUR => "SEEK_CUR".to_string(),
		libc::SEEK_END => "SEEK_END".to_string(),
		other => other.to_string(),
	}
}

/// Quote `bytes`, keeping the head and tail of long buffers
fn short_string(bytes: &[u8]) -> String {
	let mut quoted = String::with_capacity(bytes.len() + 2);
	quoted.push('"');
	for &b in bytes {
		match b {
			b'"' => quoted.push_str("\\\""),
			b'\\' => quoted.push_str("\\\\"),
			b'\n' => quoted.push_str("\\n"),
			b'\t' => quoted.push_str("\\t"),
			b'\r' => quoted.push_str("\\r"),
			0x20..=0x7e => quoted.push(b as char),
			_ => {
				let _ = write!(quoted, "\\x{b:02x}");
			},
		}
	}
	quoted.push('"');

	if quoted.len() <= MAX_QUOTED {
		return quoted;
	}
	// escapes are ascii, so every index is a char boundary
	format!("{}\"...\"{}", &quoted[..18], &quoted[quoted.len() - 19..])
}

impl<W: Write> Interceptor for TraceWriter<W> {
	fn before(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		self.descriptors.before(event, ctx)?;
		let text = self.entry_text(event, ctx)?;
		self.output.write_all(text.as_bytes())?;
		self.in_syscall = true;
		Ok(())
	}

	fn after(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		if !self.in_syscall {
			// the stop right after exec has no entry half
			write!(self.output, "{}() ", event.name())?;
		}
		let text = self.exit_text(event, ctx)?;
		writeln!(self.output, "{text}")?;
		self.output.flush()?;
		self.in_syscall = false;
		self.descriptors.after(event, ctx)
	}

	fn finish(&mut self, exit: &TraceExit) -> Result<()> {
		if self.in_syscall {
			writeln!(self.output, "= ?")?;
			self.in_syscall = false;
		}
		match exit {
			TraceExit::Exited(code) => writeln!(self.output, "+++ exited with {code} +++")?,
			TraceExit::Signaled(signal) => writeln!(self.output, "+++ killed by {signal} +++")?,
		}
		self.output.flush()?;
		Ok(())
	}

	fn name(&self) -> &'static str {
		"TraceWriter"
	}
}
