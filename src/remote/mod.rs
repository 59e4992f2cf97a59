//! Remote resources addressed by byte range
//!
//! [`RangeSource`] is the seam between the range proxy and the transport:
//! one metadata request and any number of ranged fetches. [`HttpSource`]
//! implements it over HTTP.

mod http;

pub use http::HttpSource;

use std::fmt;

use crate::tracer::{Result, TraceError};

/// Status line and headers of a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
	/// Protocol version, e.g. `HTTP/1.1`
	pub version: String,
	/// Status code
	pub status: u16,
	/// Reason phrase
	pub status_text: String,
	/// Header fields in the order received
	pub headers: Vec<(String, String)>,
}

impl ResponseHead {
	/// First value of header `name`, compared case-insensitively
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

impl fmt::Display for ResponseHead {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {}", self.version, self.status, self.status_text)
	}
}

/// A response to a ranged fetch
#[derive(Debug, Clone, Default)]
pub struct RangeResponse {
	/// Status line and headers
	pub head: ResponseHead,
	/// Body bytes received
	pub body: Vec<u8>,
}

/// Half-open byte range `[start, end)`
///
/// The request header is written as `bytes=<start>-<end>`. HTTP reads the
/// upper bound as inclusive, so servers may send one byte more than
/// [`ByteRange::len`]; the surplus is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
	/// First byte
	pub start: u64,
	/// One past the last byte
	pub end: u64,
}

impl ByteRange {
	/// Range of `len` bytes from `start`
	#[must_use]
	pub const fn new(start: u64, len: u64) -> Self {
		Self {
			start,
			end: start + len,
		}
	}

	/// Number of bytes wanted
	#[must_use]
	pub const fn len(&self) -> u64 {
		self.end - self.start
	}

	/// Whether the range is empty
	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.end <= self.start
	}
}

impl fmt::Display for ByteRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "bytes={}-{}", self.start, self.end)
	}
}

/// Validated description of a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
	/// Size in bytes, from `Content-Length`
	pub size: u64,
	/// `Content-Type`, if sent
	pub content_type: Option<String>,
	/// `Date`, if sent
	pub date: Option<String>,
	/// `Last-Modified`, if sent
	pub last_modified: Option<String>,
}

impl RemoteMetadata {
	/// Check a metadata response for `url`
	///
	/// The resource is usable when the response is `200`, carries a
	/// numeric `Content-Length` and advertises byte ranges.
	pub fn from_head(url: &str, head: &ResponseHead) -> Result<Self> {
		let reject = |reason: String| TraceError::RemoteMetadata {
			url: url.to_string(),
			reason,
		};

		if head.status != 200 {
			return Err(reject(format!("metadata request returned {}", head.status)));
		}
		let size = head
			.header("content-length")
			.ok_or_else(|| reject("no content-length".to_string()))?;
		let size = size
			.trim()
			.parse::<u64>()
			.map_err(|_| reject(format!("invalid content-length {size:?}")))?;
		let ranges = head.header("accept-ranges").unwrap_or_default();
		if !ranges.contains("bytes") {
			return Err(reject(format!("byte ranges not accepted (accept-ranges: {ranges:?})")));
		}

		Ok(Self {
			size,
			content_type: head.header("content-type").map(str::to_string),
			date: head.header("date").map(str::to_string),
			last_modified: head.header("last-modified").map(str::to_string),
		})
	}
}

/// A resource that can be described and fetched by range
pub trait RangeSource {
	/// Where the resource lives, for diagnostics
	fn url(&self) -> &str;

	/// Issue a metadata request
	///
	/// Non-success statuses are returned as responses; only transport
	/// failures are errors.
	fn head(&mut self) -> Result<ResponseHead>;

	/// Fetch `range`
	///
	/// Like [`RangeSource::head`], a status outside `2xx` is a response.
	fn get(&mut self, range: ByteRange) -> Result<RangeResponse>;
}
