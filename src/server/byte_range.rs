//! HTTP Range header parsing for audio streaming.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

const HEADER_BYTE_RANGE: &str = "Range";

/// A validated byte interval within a resource of known size.
///
/// Invariant: `0 <= start <= end < total`. Only [`ByteRange::parse`]
/// constructs values, so a `ByteRange` is never partially valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Parse a `Range` header value against the total resource size.
    ///
    /// Accepted forms after the mandatory `bytes=` prefix:
    /// - `start-end`
    /// - `start-` (open-ended, runs to the last byte)
    /// - `-N` (the last `min(N, total)` bytes)
    ///
    /// A start at or past the end of the resource is unsatisfiable and
    /// returns `None`. An `end` past the last byte (or before `start`)
    /// is clamped to `total - 1`.
    pub fn parse<S: AsRef<str>>(header: S, total: u64) -> Option<ByteRange> {
        let v = header.as_ref();
        let ranges = v.strip_prefix("bytes=")?;

        let (first, second) = ranges.split_once('-')?;

        let (start, end) = match (first.is_empty(), second.is_empty()) {
            // "start-end"
            (false, false) => (first.parse::<u64>().ok()?, second.parse::<u64>().ok()?),
            // "start-"
            (false, true) => (first.parse::<u64>().ok()?, total.saturating_sub(1)),
            // "-N": last N bytes, clamped to the whole resource
            (true, false) => {
                let suffix_len = second.parse::<u64>().ok()?;
                if suffix_len == 0 {
                    return None;
                }
                (total.saturating_sub(suffix_len), total.saturating_sub(1))
            }
            (true, true) => return None,
        };

        if start >= total {
            return None;
        }

        let end = if end < start || end >= total {
            total - 1
        } else {
            end
        };

        Some(ByteRange { start, end, total })
    }

    /// Number of bytes covered by the range (inclusive interval).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a 206 response.
    pub fn content_range_header(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// The raw `Range` header value, extracted before the file size is known.
///
/// Parsing is deferred to the handler because validation needs the total
/// size of the backing file. `None` when the client sent no `Range`
/// header (or one with a non-UTF-8 value, which no real player emits).
#[derive(Debug, Clone)]
pub struct RawRangeHeader(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for RawRangeHeader {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RawRangeHeader(
            parts
                .headers
                .get(HEADER_BYTE_RANGE)
                .and_then(|x| x.to_str().ok())
                .map(|s| s.to_string()),
        ))
    }
}
