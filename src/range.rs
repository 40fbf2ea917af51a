//! `Range` header parsing.
//!
//! Only the single-span form `bytes=<start>-<end>` (with `<end>` optional)
//! is honoured.  Suffix ranges, multi-range requests and any other unit are
//! rejected rather than ignored, and an explicit end past the last byte is
//! rejected rather than clamped.

use std::fmt;

/// An inclusive, validated byte span of an object.
///
/// Only [`parse_range`] builds one, so `start <= end < total_length` always
/// holds for the length it was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// First byte offset (inclusive).
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the span.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A validated range always holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_length)
    }
}

impl fmt::Display for ByteRange {
    /// Formats as an HTTP range request value (`bytes=a-b`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// The range cannot be honoured against the object's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range not satisfiable")]
pub struct RangeUnsatisfiable;

/// Parse a `Range` header value against a known object length.
pub fn parse_range(header_value: &str, total_length: u64) -> Result<ByteRange, RangeUnsatisfiable> {
    let spec = header_value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeUnsatisfiable)?;
    let (start_s, end_s) = spec.split_once('-').ok_or(RangeUnsatisfiable)?;

    let start = parse_offset(start_s)?;
    if start >= total_length {
        return Err(RangeUnsatisfiable);
    }

    let end = if end_s.is_empty() {
        total_length - 1
    } else {
        let end = parse_offset(end_s)?;
        if end >= total_length || end < start {
            return Err(RangeUnsatisfiable);
        }
        end
    };

    Ok(ByteRange { start, end })
}

/// Offsets are plain decimal digits; signs, whitespace and commas are refused.
fn parse_offset(s: &str) -> Result<u64, RangeUnsatisfiable> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeUnsatisfiable);
    }
    s.parse().map_err(|_| RangeUnsatisfiable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: u64, end: u64) -> ByteRange {
        ByteRange { start, end }
    }

    #[test]
    fn test_start_end_within_bounds() {
        assert_eq!(parse_range("bytes=0-499", 1000), Ok(span(0, 499)));
        assert_eq!(parse_range("bytes=10-20", 1000), Ok(span(10, 20)));
        assert_eq!(parse_range("bytes=999-999", 1000), Ok(span(999, 999)));
        assert_eq!(parse_range("bytes=0-0", 1), Ok(span(0, 0)));
    }

    #[test]
    fn test_every_valid_pair_on_small_object() {
        let total = 7;
        for start in 0..total {
            for end in start..total {
                let header = format!("bytes={start}-{end}");
                assert_eq!(parse_range(&header, total), Ok(span(start, end)), "{header}");
            }
        }
    }

    #[test]
    fn test_open_end_runs_to_last_byte() {
        assert_eq!(parse_range("bytes=100-", 1000), Ok(span(100, 999)));
        assert_eq!(parse_range("bytes=0-", 1000), Ok(span(0, 999)));
        assert_eq!(parse_range("bytes=999-", 1000), Ok(span(999, 999)));
    }

    #[test]
    fn test_start_past_end_of_object() {
        assert_eq!(parse_range("bytes=1000-", 1000), Err(RangeUnsatisfiable));
        assert_eq!(parse_range("bytes=1000-1000", 1000), Err(RangeUnsatisfiable));
        assert_eq!(parse_range("bytes=5000-10", 1000), Err(RangeUnsatisfiable));
    }

    #[test]
    fn test_explicit_end_out_of_bounds_is_rejected() {
        assert_eq!(parse_range("bytes=999-1500", 1000), Err(RangeUnsatisfiable));
        assert_eq!(parse_range("bytes=0-1000", 1000), Err(RangeUnsatisfiable));
    }

    #[test]
    fn test_end_before_start() {
        assert_eq!(parse_range("bytes=500-100", 1000), Err(RangeUnsatisfiable));
    }

    #[test]
    fn test_empty_object_has_no_satisfiable_range() {
        assert_eq!(parse_range("bytes=0-", 0), Err(RangeUnsatisfiable));
        assert_eq!(parse_range("bytes=0-0", 0), Err(RangeUnsatisfiable));
    }

    #[test]
    fn test_unsupported_grammar() {
        for header in [
            "",
            "bytes=",
            "bytes=-500",
            "bytes=0-4,6-8",
            "chars=0-4",
            "0-4",
            "bytes=a-b",
            "bytes=+1-5",
            "bytes= 1-5",
            "bytes=1-5-",
            "bytes=18446744073709551616-",
        ] {
            assert_eq!(parse_range(header, 1000), Err(RangeUnsatisfiable), "{header:?}");
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert_eq!(parse_range("  bytes=1-2 ", 10), Ok(span(1, 2)));
    }

    #[test]
    fn test_parse_is_idempotent() {
        for header in ["bytes=3-9", "bytes=12-", "bytes=-3", "bytes=50-1"] {
            assert_eq!(parse_range(header, 40), parse_range(header, 40));
        }
    }

    #[test]
    fn test_len_and_header_formatting() {
        let range = parse_range("bytes=0-499", 1000).unwrap();
        assert_eq!(range.len(), 500);
        assert_eq!(range.content_range(1000), "bytes 0-499/1000");
        assert_eq!(range.to_string(), "bytes=0-499");
    }
}
