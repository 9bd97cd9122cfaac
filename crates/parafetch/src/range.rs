//! Byte-range value type, `Content-Range` parsing and chunk partition math.

use std::fmt;

/// A byte range of the remote resource.
///
/// `length = None` means "from `offset` to the end of the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl DownloadRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// The full resource, `[0, ∞)`.
    pub fn full() -> Self {
        Self {
            offset: 0,
            length: None,
        }
    }

    /// Range for resuming this range after `emitted` bytes have already been
    /// delivered downstream.
    pub(crate) fn resume_from(&self, emitted: u64) -> Self {
        Self {
            offset: self.offset + emitted,
            length: self.length.map(|len| len.saturating_sub(emitted)),
        }
    }
}

impl fmt::Display for DownloadRange {
    /// Formats as an HTTP `Range` request header value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            // A zero-length range still needs a syntactically valid header;
            // "bytes=0--1" is not one, so ask for the first byte position.
            Some(0) => write!(f, "bytes={}-{}", self.offset, self.offset),
            Some(len) => write!(f, "bytes={}-{}", self.offset, self.offset + len - 1),
            None => write!(f, "bytes={}-", self.offset),
        }
    }
}

impl Default for DownloadRange {
    fn default() -> Self {
        Self::full()
    }
}

/// Extracts the total resource length from a `Content-Range` header value.
///
/// Accepts both `bytes <start>-<end>/<total>` and `bytes */<total>`. A missing
/// or malformed header reads as 0, matching the probe protocol's treatment of
/// 416 responses without a usable total.
pub(crate) fn total_length(content_range: Option<&str>) -> u64 {
    content_range
        .and_then(|value| value.rsplit('/').next())
        .and_then(|total| total.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Number of chunks needed to cover `resolved_len` bytes in blocks of
/// `block_size`, with a floor of one so a zero-length resource still gets one
/// request/response cycle.
pub(crate) fn chunk_count(resolved_len: u64, block_size: u64) -> u64 {
    (resolved_len.div_ceil(block_size)).max(1)
}

/// Byte range of chunk `index` within a download of `resolved_len` bytes
/// starting at `offset`.
pub(crate) fn chunk_range(index: u64, offset: u64, resolved_len: u64, block_size: u64) -> DownloadRange {
    let modifier = index * block_size;
    DownloadRange::new(
        offset + modifier,
        Some(block_size.min(resolved_len - modifier.min(resolved_len))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_forms() {
        assert_eq!(DownloadRange::new(0, None).to_string(), "bytes=0-");
        assert_eq!(DownloadRange::new(10, Some(90)).to_string(), "bytes=10-99");
        assert_eq!(DownloadRange::new(0, Some(0)).to_string(), "bytes=0-0");
        assert_eq!(DownloadRange::new(5, Some(1)).to_string(), "bytes=5-5");
    }

    #[test]
    fn resume_narrows_bounded_range() {
        let range = DownloadRange::new(100, Some(50));
        let resumed = range.resume_from(20);
        assert_eq!(resumed.offset, 120);
        assert_eq!(resumed.length, Some(30));
    }

    #[test]
    fn resume_keeps_open_end() {
        let range = DownloadRange::new(0, None);
        let resumed = range.resume_from(7);
        assert_eq!(resumed.offset, 7);
        assert_eq!(resumed.length, None);
    }

    #[test]
    fn total_length_parses_both_header_forms() {
        assert_eq!(total_length(Some("bytes 0-6/7")), 7);
        assert_eq!(total_length(Some("bytes */1024")), 1024);
        assert_eq!(total_length(Some("bytes */0")), 0);
    }

    #[test]
    fn total_length_of_garbage_is_zero() {
        assert_eq!(total_length(None), 0);
        assert_eq!(total_length(Some("")), 0);
        assert_eq!(total_length(Some("bytes 0-6/*")), 0);
        assert_eq!(total_length(Some("nonsense")), 0);
    }

    #[test]
    fn chunk_count_has_floor_of_one() {
        assert_eq!(chunk_count(0, 10), 1);
        assert_eq!(chunk_count(1, 10), 1);
        assert_eq!(chunk_count(10, 10), 1);
        assert_eq!(chunk_count(11, 10), 2);
        assert_eq!(chunk_count(25, 10), 3);
    }

    #[test]
    fn partition_covers_resource_without_gaps_or_overlaps() {
        for &(offset, len, block) in &[
            (0u64, 25u64, 10u64),
            (10, 40, 7),
            (0, 1, 4),
            (3, 100, 100),
            (0, 4096, 1024),
            (5, 13, 1),
        ] {
            let count = chunk_count(len, block);
            let mut expected_offset = offset;
            let mut covered = 0u64;
            for index in 0..count {
                let range = chunk_range(index, offset, len, block);
                assert_eq!(range.offset, expected_offset, "chunk {index} start");
                let chunk_len = range.length.unwrap();
                assert!(chunk_len <= block);
                expected_offset += chunk_len;
                covered += chunk_len;
            }
            assert_eq!(covered, len, "offset={offset} len={len} block={block}");
        }
    }

    #[test]
    fn partition_of_twenty_five_by_ten() {
        // total 25, block 10: chunks [0,10) [10,20) [20,25)
        assert_eq!(chunk_count(25, 10), 3);
        assert_eq!(chunk_range(0, 0, 25, 10), DownloadRange::new(0, Some(10)));
        assert_eq!(chunk_range(1, 0, 25, 10), DownloadRange::new(10, Some(10)));
        assert_eq!(chunk_range(2, 0, 25, 10), DownloadRange::new(20, Some(5)));
    }
}
