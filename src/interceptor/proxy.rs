//! Remote-backed file proxy
//!
//! The proxy stands behind one local file. The file is created empty and
//! sized to the remote resource; bytes are only fetched when the tracee
//! reads them. Staging happens at syscall entry, so by the time the kernel
//! performs the tracee's read the requested window is already on disk.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::tracking::open_path_index;
use super::{DescriptorTracker, InterceptContext, Interceptor};
use crate::remote::{ByteRange, HttpSource, RangeSource, RemoteMetadata};
use crate::syscall::{Syscall, SyscallEvent};
use crate::tracer::{ProxyConfig, Result, TraceError};

/// Lazily fills a local file from a ranged remote resource
///
/// The proxy mirrors the tracee's file offset on the monitored file in its
/// own cursor. It only acts on `read`, `pread64` and `lseek` for
/// descriptors opened with the monitored path; everything else passes
/// through.
#[derive(Debug)]
pub struct RangeProxy<S: RangeSource = HttpSource> {
	filename: String,
	backing: Option<Backing<S>>,
	descriptors: DescriptorTracker,
}

#[derive(Debug)]
struct Backing<S> {
	source: S,
	file: File,
	path: PathBuf,
	metadata: Option<RemoteMetadata>,
	cursor: u64,
}

impl RangeProxy<HttpSource> {
	/// Create a proxy for `config`
	///
	/// The proxy is inert unless both a filename and a URL are configured.
	pub fn from_config(config: &ProxyConfig) -> Result<Self> {
		if !config.is_enabled() {
			return Ok(Self::disabled());
		}
		Self::open(&config.filename, HttpSource::new(&config.url, config.timeout))
	}
}

impl<S: RangeSource> RangeProxy<S> {
	/// A proxy that ignores every syscall
	#[must_use]
	pub fn disabled() -> Self {
		Self {
			filename: String::new(),
			backing: None,
			descriptors: DescriptorTracker::new(),
		}
	}

	/// Create or truncate `filename` and proxy it from `source`
	///
	/// The remote size is left unresolved; see [`RangeProxy::resolve_size`].
	pub fn open(filename: impl Into<String>, source: S) -> Result<Self> {
		let filename = filename.into();
		let path = PathBuf::from(&filename);
		let file = File::options()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(&path)
			.map_err(|source| TraceError::LocalFile {
				path: path.clone(),
				source,
			})?;
		debug!(filename, url = source.url(), "proxy backing file created");

		Ok(Self {
			filename,
			backing: Some(Backing {
				source,
				file,
				path,
				metadata: None,
				cursor: 0,
			}),
			descriptors: DescriptorTracker::new(),
		})
	}

	/// Whether the proxy acts on syscalls at all
	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.backing.is_some()
	}

	/// The monitored path
	#[must_use]
	pub fn filename(&self) -> &str {
		&self.filename
	}

	/// The proxy's view of the tracee's file offset
	#[must_use]
	pub fn cursor(&self) -> u64 {
		self.backing.as_ref().map_or(0, |backing| backing.cursor)
	}

	/// The remote size, once resolved
	#[must_use]
	pub fn size(&self) -> Option<u64> {
		self.metadata().map(|meta| meta.size)
	}

	/// Remote metadata, once resolved
	#[must_use]
	pub fn metadata(&self) -> Option<&RemoteMetadata> {
		self.backing.as_ref().and_then(|backing| backing.metadata.as_ref())
	}

	/// The underlying source
	#[must_use]
	pub fn source(&self) -> Option<&S> {
		self.backing.as_ref().map(|backing| &backing.source)
	}

	/// Query the remote size and extend the local file to match
	///
	/// Only the first call issues a request. Returns `None` when disabled.
	pub fn resolve_size(&mut self) -> Result<Option<u64>> {
		match self.backing.as_mut() {
			Some(backing) => backing.resolve_size().map(Some),
			None => Ok(None),
		}
	}

	/// Move the cursor the way `lseek(fd, offset, whence)` would
	pub fn seek(&mut self, offset: i64, whence: i32) -> Result<u64> {
		match self.backing.as_mut() {
			Some(backing) => backing.seek(offset, whence),
			None => Ok(0),
		}
	}

	/// Stage the next `count` bytes at the cursor and advance past them
	///
	/// Returns the number of bytes staged.
	pub fn read(&mut self, count: u64) -> Result<u64> {
		let Some(backing) = self.backing.as_mut() else {
			return Ok(0);
		};
		let staged = backing.stage(backing.cursor, count)?;
		backing.cursor += staged;
		Ok(staged)
	}

	/// Stage `count` bytes at `offset` without touching the cursor
	pub fn read_at(&mut self, offset: u64, count: u64) -> Result<u64> {
		match self.backing.as_mut() {
			Some(backing) => backing.stage(offset, count),
			None => Ok(0),
		}
	}

	fn monitors(&self, fd: i32, ctx: &InterceptContext<'_>) -> bool {
		ctx.path_for(fd) == Some(self.filename.as_str())
	}
}

impl<S: RangeSource> Backing<S> {
	fn resolve_size(&mut self) -> Result<u64> {
		if let Some(meta) = &self.metadata {
			return Ok(meta.size);
		}

		let url = self.source.url().to_string();
		info!(%url, "> HEAD");
		let head = self.source.head()?;
		info!(%url, "< {head}");
		let meta = RemoteMetadata::from_head(&url, &head)?;
		info!(
			size = meta.size,
			content_type = meta.content_type.as_deref().unwrap_or("-"),
			date = meta.date.as_deref().unwrap_or("-"),
			last_modified = meta.last_modified.as_deref().unwrap_or("-"),
			"remote resource"
		);

		self.file.set_len(meta.size).map_err(|source| TraceError::LocalFile {
			path: self.path.clone(),
			source,
		})?;
		let size = meta.size;
		self.metadata = Some(meta);
		Ok(size)
	}

	fn seek(&mut self, offset: i64, whence: i32) -> Result<u64> {
		let target = match whence {
			libc::SEEK_SET => Some(offset),
			libc::SEEK_CUR => (self.cursor as i64).checked_add(offset),
			libc::SEEK_END => (self.resolve_size()? as i64).checked_add(offset),
			other => {
				return Err(TraceError::ProtocolViolation(format!(
					"lseek whence {other} on {}",
					self.path.display()
				)));
			},
		};

		match target {
			Some(target) if target >= 0 => self.cursor = target as u64,
			_ => warn!(offset, whence, cursor = self.cursor, "lseek outside the file, cursor kept"),
		}
		debug!(cursor = self.cursor, "proxy cursor");
		Ok(self.cursor)
	}

	fn stage(&mut self, start: u64, count: u64) -> Result<u64> {
		let size = self.resolve_size()?;
		let want = count.min(size.saturating_sub(start));
		if want == 0 {
			debug!(start, count, size, "nothing to stage");
			return Ok(0);
		}

		let url = self.source.url().to_string();
		let range = ByteRange::new(start, want);
		info!(%url, %range, "> GET");
		let response = self.source.get(range)?;
		info!(%url, "< {}", response.head);

		let status = response.head.status;
		if !(200..300).contains(&status) {
			return Err(TraceError::RemoteFetch {
				url,
				reason: format!("{range} returned {status}"),
			});
		}
		// anything but a partial response carries the resource from offset 0
		let body = if status == 206 {
			&response.body[..]
		} else {
			response.body.get(start as usize..).unwrap_or_default()
		};
		let Some(bytes) = body.get(..want as usize) else {
			return Err(TraceError::RemoteFetch {
				url,
				reason: format!("{range} returned {} bytes, wanted {want}", body.len()),
			});
		};

		self.file.write_all_at(bytes, start).map_err(|source| TraceError::LocalFile {
			path: self.path.clone(),
			source,
		})?;
		info!(bytes = want, offset = start, "wrote bytes");
		Ok(want)
	}
}

impl<S: RangeSource> Interceptor for RangeProxy<S> {
	fn before(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		if !self.is_enabled() {
			return Ok(());
		}
		self.descriptors.before(event, ctx)?;

		match event.syscall() {
			Some(Syscall::lseek) if self.monitors(event.fd_arg(0), ctx) => {
				self.seek(event.args.arg2 as i64, event.args.arg3 as i32).map(drop)
			},
			Some(Syscall::read) if self.monitors(event.fd_arg(0), ctx) => self.read(event.args.arg3).map(drop),
			Some(Syscall::pread64) if self.monitors(event.fd_arg(0), ctx) => {
				self.read_at(event.args.arg4, event.args.arg3).map(drop)
			},
			_ => Ok(()),
		}
	}

	fn after(&mut self, event: &SyscallEvent, ctx: &mut InterceptContext<'_>) -> Result<()> {
		if !self.is_enabled() {
			return Ok(());
		}
		let opens = event.syscall().and_then(open_path_index).is_some();
		if let (true, Some(fd)) = (opens, event.success()) {
			// a fresh descriptor starts at offset 0
			if self.descriptors.pending_path() == Some(self.filename.as_str()) {
				if let Some(backing) = self.backing.as_mut() {
					backing.cursor = 0;
					debug!(fd, "monitored file opened, cursor reset");
				}
			}
		}
		self.descriptors.after(event, ctx)
	}

	fn name(&self) -> &'static str {
		"RangeProxy"
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use tempfile::TempDir;

	use super::*;
	use crate::registry::FileDescriptorRegistry;
	use crate::remote::{RangeResponse, ResponseHead};
	use crate::syscall::SyscallArgs;
	use crate::testing::FakeMemory;
	use crate::tracer::ErrorKind;

	/// How the fake server answers range requests
	#[derive(Debug, Clone, Copy, PartialEq)]
	enum Ranges {
		Honored,
		Ignored,
		Truncated,
		Refused,
	}

	#[derive(Debug)]
	struct FakeSource {
		data: Vec<u8>,
		ranges: Ranges,
		heads: Cell<usize>,
		gets: Vec<ByteRange>,
	}

	impl FakeSource {
		fn new(len: usize, ranges: Ranges) -> Self {
			Self {
				data: (0..len).map(|i| (i % 251) as u8).collect(),
				ranges,
				heads: Cell::new(0),
				gets: Vec::new(),
			}
		}
	}

	fn ok_head(status: u16) -> ResponseHead {
		ResponseHead {
			version: "HTTP/1.1".into(),
			status,
			status_text: "OK".into(),
			headers: Vec::new(),
		}
	}

	impl RangeSource for FakeSource {
		fn url(&self) -> &str {
			"http://fake/data.bin"
		}

		fn head(&mut self) -> Result<ResponseHead> {
			self.heads.set(self.heads.get() + 1);
			let mut head = ok_head(200);
			head.headers = vec![
				("Content-Length".into(), self.data.len().to_string()),
				("Accept-Ranges".into(), "bytes".into()),
			];
			Ok(head)
		}

		fn get(&mut self, range: ByteRange) -> Result<RangeResponse> {
			self.gets.push(range);
			let start = range.start as usize;
			// inclusive upper bound, clipped to the resource
			let end = (range.end as usize + 1).min(self.data.len());
			let (head, body) = match self.ranges {
				Ranges::Honored => (ok_head(206), self.data[start..end].to_vec()),
				Ranges::Ignored => (ok_head(200), self.data.clone()),
				Ranges::Truncated => (ok_head(206), self.data[start..end][..1].to_vec()),
				Ranges::Refused => (ok_head(416), Vec::new()),
			};
			Ok(RangeResponse { head, body })
		}
	}

	fn proxy(dir: &TempDir, len: usize, ranges: Ranges) -> RangeProxy<FakeSource> {
		let path = dir.path().join("data.bin");
		RangeProxy::open(path.to_string_lossy(), FakeSource::new(len, ranges)).unwrap()
	}

	fn local_bytes(proxy: &RangeProxy<FakeSource>) -> Vec<u8> {
		std::fs::read(proxy.filename()).unwrap()
	}

	#[test]
	fn test_open_truncates_and_defers_size() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("data.bin");
		std::fs::write(&path, b"stale contents").unwrap();

		let mut proxy = RangeProxy::open(path.to_string_lossy(), FakeSource::new(1000, Ranges::Honored)).unwrap();
		assert!(proxy.is_enabled());
		assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
		assert_eq!(proxy.source().unwrap().heads.get(), 0);
		assert_eq!(proxy.size(), None);

		assert_eq!(proxy.resolve_size().unwrap(), Some(1000));
		assert_eq!(proxy.resolve_size().unwrap(), Some(1000));
		assert_eq!(proxy.source().unwrap().heads.get(), 1);
		assert_eq!(std::fs::metadata(&path).unwrap().len(), 1000);
	}

	#[test]
	fn test_seek_whence() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 100, Ranges::Honored);

		assert_eq!(proxy.seek(10, libc::SEEK_SET).unwrap(), 10);
		assert_eq!(proxy.seek(5, libc::SEEK_CUR).unwrap(), 15);
		assert_eq!(proxy.seek(-10, libc::SEEK_END).unwrap(), 90);
		assert_eq!(proxy.seek(40, libc::SEEK_SET).unwrap(), 40);
		assert_eq!(proxy.source().unwrap().heads.get(), 1);
	}

	#[test]
	fn test_seek_negative_keeps_cursor() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 100, Ranges::Honored);

		proxy.seek(20, libc::SEEK_SET).unwrap();
		assert_eq!(proxy.seek(-30, libc::SEEK_CUR).unwrap(), 20);
		assert_eq!(proxy.seek(-1, libc::SEEK_SET).unwrap(), 20);
		assert_eq!(proxy.seek(500, libc::SEEK_SET).unwrap(), 500);
	}

	#[test]
	fn test_seek_unknown_whence() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 100, Ranges::Honored);

		let err = proxy.seek(0, 7).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
	}

	#[test]
	fn test_read_stages_window() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 1000, Ranges::Honored);

		assert_eq!(proxy.read(50).unwrap(), 50);
		assert_eq!(proxy.cursor(), 50);
		assert_eq!(proxy.source().unwrap().gets, vec![ByteRange { start: 0, end: 50 }]);
		assert_eq!(proxy.source().unwrap().gets[0].to_string(), "bytes=0-50");

		let local = local_bytes(&proxy);
		let remote = &proxy.source().unwrap().data;
		assert_eq!(local.len(), 1000);
		assert_eq!(&local[..50], &remote[..50]);
		assert!(local[50..].iter().all(|&b| b == 0));
	}

	#[test]
	fn test_read_clamps_at_end() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 100, Ranges::Honored);

		proxy.seek(90, libc::SEEK_SET).unwrap();
		assert_eq!(proxy.read(50).unwrap(), 10);
		assert_eq!(proxy.cursor(), 100);
		assert_eq!(proxy.read(50).unwrap(), 0);
		assert_eq!(proxy.source().unwrap().gets.len(), 1);

		let local = local_bytes(&proxy);
		assert_eq!(&local[90..], &proxy.source().unwrap().data[90..]);
	}

	#[test]
	fn test_read_when_range_ignored() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 300, Ranges::Ignored);

		proxy.seek(100, libc::SEEK_SET).unwrap();
		assert_eq!(proxy.read(20).unwrap(), 20);

		let local = local_bytes(&proxy);
		assert_eq!(&local[100..120], &proxy.source().unwrap().data[100..120]);
	}

	#[test]
	fn test_read_at_keeps_cursor() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 300, Ranges::Honored);

		assert_eq!(proxy.read_at(200, 30).unwrap(), 30);
		assert_eq!(proxy.cursor(), 0);
		assert_eq!(&local_bytes(&proxy)[200..230], &proxy.source().unwrap().data[200..230]);
	}

	#[test]
	fn test_short_or_refused_bodies_are_fatal() {
		let dir = tempfile::tempdir().unwrap();

		let mut short = proxy(&dir, 100, Ranges::Truncated);
		assert_eq!(short.read(10).unwrap_err().kind(), ErrorKind::RemoteFetchError);

		let mut refused = proxy(&dir, 100, Ranges::Refused);
		assert_eq!(refused.read(10).unwrap_err().kind(), ErrorKind::RemoteFetchError);
		assert_eq!(refused.cursor(), 0);
	}

	const PATH_ADDR: u64 = 0x2000;

	fn open_event(path_addr: u64) -> SyscallEvent {
		SyscallEvent::entry(
			Syscall::openat.number(),
			SyscallArgs::new(libc::AT_FDCWD as u64, path_addr, 0, 0, 0, 0),
		)
	}

	fn call(
		proxy: &mut RangeProxy<FakeSource>,
		ctx: &mut InterceptContext<'_>,
		syscall: Syscall,
		args: SyscallArgs,
		ret: i64,
	) {
		let entry = SyscallEvent::entry(syscall.number(), args);
		proxy.before(&entry, ctx).unwrap();
		proxy
			.after(&SyscallEvent::exit(syscall.number(), args, ret), ctx)
			.unwrap();
	}

	#[test]
	fn test_proxied_session() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 1000, Ranges::Honored);
		let memory = FakeMemory::new().with_string(PATH_ADDR, proxy.filename());
		let mut registry = FileDescriptorRegistry::new();
		let mut ctx = InterceptContext::new(&memory, &mut registry);

		let open = open_event(PATH_ADDR);
		proxy.before(&open, &mut ctx).unwrap();
		proxy
			.after(&SyscallEvent::exit(open.number, open.args, 3), &mut ctx)
			.unwrap();
		assert_eq!(ctx.fd_for(proxy.filename()), Some(3));

		let end = -100_i64 as u64;
		call(&mut proxy, &mut ctx, Syscall::lseek, SyscallArgs::new(3, end, 2, 0, 0, 0), 900);
		assert_eq!(proxy.cursor(), 900);
		call(&mut proxy, &mut ctx, Syscall::lseek, SyscallArgs::new(3, 0, 0, 0, 0, 0), 0);
		call(&mut proxy, &mut ctx, Syscall::read, SyscallArgs::new(3, 0x9000, 100, 0, 0, 0), 100);
		assert_eq!(proxy.cursor(), 100);

		// other descriptors pass through
		call(&mut proxy, &mut ctx, Syscall::read, SyscallArgs::new(0, 0x9000, 100, 0, 0, 0), 100);
		call(&mut proxy, &mut ctx, Syscall::lseek, SyscallArgs::new(4, 0, 9, 0, 0, 0), 0);
		assert_eq!(proxy.cursor(), 100);
		assert_eq!(proxy.source().unwrap().gets.len(), 1);

		let local = local_bytes(&proxy);
		assert_eq!(&local[..100], &proxy.source().unwrap().data[..100]);

		call(&mut proxy, &mut ctx, Syscall::close, SyscallArgs::new(3, 0, 0, 0, 0, 0), 0);
		assert_eq!(ctx.fd_for(proxy.filename()), None);
	}

	#[test]
	fn test_reopen_starts_at_offset_zero() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 1000, Ranges::Honored);
		let memory = FakeMemory::new().with_string(PATH_ADDR, proxy.filename());
		let mut registry = FileDescriptorRegistry::new();
		let mut ctx = InterceptContext::new(&memory, &mut registry);
		let open = open_event(PATH_ADDR);

		call(&mut proxy, &mut ctx, Syscall::openat, open.args, 3);
		call(&mut proxy, &mut ctx, Syscall::lseek, SyscallArgs::new(3, 500, 0, 0, 0, 0), 500);
		call(&mut proxy, &mut ctx, Syscall::read, SyscallArgs::new(3, 0x9000, 10, 0, 0, 0), 10);
		call(&mut proxy, &mut ctx, Syscall::close, SyscallArgs::new(3, 0, 0, 0, 0, 0), 0);
		assert_eq!(proxy.cursor(), 510);

		call(&mut proxy, &mut ctx, Syscall::openat, open.args, 3);
		assert_eq!(proxy.cursor(), 0);
		call(&mut proxy, &mut ctx, Syscall::read, SyscallArgs::new(3, 0x9000, 10, 0, 0, 0), 10);
		assert_eq!(proxy.cursor(), 10);
		assert_eq!(proxy.source().unwrap().gets, vec![
			ByteRange { start: 500, end: 510 },
			ByteRange { start: 0, end: 10 },
		]);

		let local = local_bytes(&proxy);
		let remote = &proxy.source().unwrap().data;
		assert_eq!(&local[..10], &remote[..10]);
		assert_eq!(&local[500..510], &remote[500..510]);
	}

	#[test]
	fn test_failed_open_keeps_cursor() {
		let dir = tempfile::tempdir().unwrap();
		let mut proxy = proxy(&dir, 1000, Ranges::Honored);
		let memory = FakeMemory::new().with_string(PATH_ADDR, proxy.filename());
		let mut registry = FileDescriptorRegistry::new();
		let mut ctx = InterceptContext::new(&memory, &mut registry);
		let open = open_event(PATH_ADDR);

		call(&mut proxy, &mut ctx, Syscall::openat, open.args, 3);
		call(&mut proxy, &mut ctx, Syscall::lseek, SyscallArgs::new(3, 200, 0, 0, 0, 0), 200);
		call(&mut proxy, &mut ctx, Syscall::openat, open.args, -i64::from(libc::EMFILE));
		assert_eq!(proxy.cursor(), 200);
	}

	#[test]
	fn test_disabled_proxy_is_inert() {
		let mut proxy = RangeProxy::<FakeSource>::disabled();
		let memory = FakeMemory::new();
		let mut registry = FileDescriptorRegistry::new();
		registry.record(3, "");
		let mut ctx = InterceptContext::new(&memory, &mut registry);

		assert!(!proxy.is_enabled());
		// would be unreadable if the proxy looked at it
		proxy.before(&open_event(PATH_ADDR), &mut ctx).unwrap();
		call(&mut proxy, &mut ctx, Syscall::read, SyscallArgs::new(3, 0, 10, 0, 0, 0), 10);
		assert_eq!(proxy.resolve_size().unwrap(), None);
		assert!(proxy.source().is_none());
	}

	#[test]
	fn test_disabled_config() {
		let config = ProxyConfig::new("", "http://host/f");
		assert!(!RangeProxy::<HttpSource>::from_config(&config).unwrap().is_enabled());
	}
}
