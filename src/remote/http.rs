//! HTTP transport for ranged fetches

use std::io::Read;
use std::time::Duration;

use tracing::trace;

use super::{ByteRange, RangeResponse, RangeSource, ResponseHead};
use crate::tracer::{Result, TraceError};

/// A resource served over HTTP
///
/// Every request is bounded by the timeout given at construction.
pub struct HttpSource {
	url: String,
	agent: ureq::Agent,
}

impl std::fmt::Debug for HttpSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpSource")
			.field("url", &self.url)
			.finish_non_exhaustive()
	}
}

impl HttpSource {
	/// Create a source for `url`
	#[must_use]
	pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
		Self {
			url: url.into(),
			agent: ureq::AgentBuilder::new().timeout(timeout).build(),
		}
	}
}

fn response_head(response: &ureq::Response) -> ResponseHead {
	let headers = response
		.headers_names()
		.into_iter()
		.filter_map(|name| {
			let value = response.header(&name)?.to_string();
			Some((name, value))
		})
		.collect();

	ResponseHead {
		version: response.http_version().to_string(),
		status: response.status(),
		status_text: response.status_text().to_string(),
		headers,
	}
}

impl RangeSource for HttpSource {
	fn url(&self) -> &str {
		&self.url
	}

	fn head(&mut self) -> Result<ResponseHead> {
		match self.agent.head(&self.url).call() {
			Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response_head(&response)),
			Err(err) => Err(TraceError::RemoteMetadata {
				url: self.url.clone(),
				reason: err.to_string(),
			}),
		}
	}

	fn get(&mut self, range: ByteRange) -> Result<RangeResponse> {
		let fetch_error = |reason: String| TraceError::RemoteFetch {
			url: self.url.clone(),
			reason,
		};

		let response = match self.agent.get(&self.url).set("Range", &range.to_string()).call() {
			Ok(response) | Err(ureq::Error::Status(_, response)) => response,
			Err(err) => return Err(fetch_error(err.to_string())),
		};
		let head = response_head(&response);

		// A server ignoring the range sends the whole resource; nothing past
		// the end of the range is ever used.
		let mut body = Vec::new();
		if (200..300).contains(&head.status) {
			response
				.into_reader()
				.take(range.end + 1)
				.read_to_end(&mut body)
				.map_err(|err| fetch_error(err.to_string()))?;
		}
		trace!(url = %self.url, %range, status = head.status, received = body.len(), "range response");

		Ok(RangeResponse { head, body })
	}
}
