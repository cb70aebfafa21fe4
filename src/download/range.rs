//! Byte ranges and their HTTP representations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Requested or reported byte range of a file.
///
/// `(0, 0)` means the whole file; a zero `length` with a non-zero `offset`
/// means "everything from `offset` on".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte.
    pub offset: u64,
    /// Number of bytes; 0 for all remaining.
    pub length: u64,
}

impl ByteRange {
    /// The whole file.
    pub const WHOLE: Self = Self {
        offset: 0,
        length: 0,
    };

    /// Creates a range.
    #[must_use]
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// True unless this is the whole-file range.
    #[must_use]
    pub fn is_ranged(self) -> bool {
        self.offset > 0 || self.length > 0
    }

    /// Value for an HTTP `Range` request header, or `None` for the whole file.
    #[must_use]
    pub fn to_header_value(self) -> Option<String> {
        if !self.is_ranged() {
            return None;
        }
        if self.length == 0 {
            Some(format!("bytes={}-", self.offset))
        } else {
            let last = self.offset.saturating_add(self.length - 1);
            Some(format!("bytes={}-{last}", self.offset))
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ranged() {
            write!(f, "{}+{}", self.offset, self.length)
        } else {
            f.write_str("whole")
        }
    }
}

/// Parses a `Content-Range` response header (`bytes 100-199/500`).
///
/// Returns the start offset and length of the delivered part. The total
/// after the slash is not needed and is not validated.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ByteRange> {
    let mut parts = value.split(' ');
    let (Some(unit), Some(spec), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if unit != "bytes" {
        return None;
    }
    let (start, rest) = spec.split_once('-')?;
    if rest.contains('-') {
        return None;
    }
    let start: u64 = start.parse().ok()?;
    let end = rest.split('/').next()?;
    let end: u64 = end.parse().ok()?;
    let length = end.checked_add(1)?.checked_sub(start)?;
    Some(ByteRange::new(start, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_partial() {
        assert_eq!(
            parse_content_range("bytes 100-199/500"),
            Some(ByteRange::new(100, 100))
        );
        assert_eq!(
            parse_content_range("bytes 0-0/*"),
            Some(ByteRange::new(0, 1))
        );
    }

    #[test]
    fn test_parse_content_range_rejects_malformed() {
        assert_eq!(parse_content_range(""), None);
        assert_eq!(parse_content_range("bytes */500"), None);
        assert_eq!(parse_content_range("items 0-9/10"), None);
        assert_eq!(parse_content_range("bytes 10-5/20"), None);
        assert_eq!(parse_content_range("bytes  1-2/3"), None);
        assert_eq!(parse_content_range("bytes 1-2-3/4"), None);
    }

    #[test]
    fn test_range_header_value() {
        assert_eq!(ByteRange::WHOLE.to_header_value(), None);
        assert_eq!(
            ByteRange::new(100, 0).to_header_value().as_deref(),
            Some("bytes=100-")
        );
        assert_eq!(
            ByteRange::new(100, 100).to_header_value().as_deref(),
            Some("bytes=100-199")
        );
        assert_eq!(
            ByteRange::new(0, 10).to_header_value().as_deref(),
            Some("bytes=0-9")
        );
    }
}
