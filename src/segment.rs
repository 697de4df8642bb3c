//! Pure byte-offset <-> sequence-number mapping, independent of I/O.

use crate::Error;

/// Segmentation of a `total_len`-byte transfer into fixed-size pieces of
/// at most `payload_max` bytes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    payload_max: u32,
    total_len: u64,
    num_segments: u32,
}

impl Segmenter {
    /// Builds a segmenter for `total_len` bytes at `payload_max` bytes per
    /// segment. Rejects a zero-length transfer, since `N = 0` is forbidden.
    pub fn new(total_len: u64, payload_max: u32) -> Result<Self, Error> {
        if total_len == 0 {
            return Err(Error::EmptyTransfer);
        }
        let num_segments = ((total_len + payload_max as u64 - 1) / payload_max as u64) as u32;
        Ok(Segmenter {
            payload_max,
            total_len,
            num_segments,
        })
    }

    pub fn payload_max(&self) -> u32 {
        self.payload_max
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// `N`, the highest valid segment number.
    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    /// Byte offset of segment `k` (one-based).
    pub fn offset(&self, k: u32) -> u64 {
        (k - 1) as u64 * self.payload_max as u64
    }

    /// Byte length of segment `k` (one-based); `payload_max` for every
    /// segment but possibly the last.
    pub fn length(&self, k: u32) -> u32 {
        let remaining = self.total_len - self.offset(k);
        remaining.min(self.payload_max as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_transfer() {
        assert!(matches!(Segmenter::new(0, 512), Err(Error::EmptyTransfer)));
    }

    #[test]
    fn exact_multiple_has_full_last_segment() {
        let seg = Segmenter::new(1024, 512).unwrap();
        assert_eq!(seg.num_segments(), 2);
        assert_eq!(seg.length(1), 512);
        assert_eq!(seg.length(2), 512);
    }

    #[test]
    fn partial_last_segment() {
        let seg = Segmenter::new(1500, 512).unwrap();
        assert_eq!(seg.num_segments(), 3);
        assert_eq!(seg.length(1), 512);
        assert_eq!(seg.length(2), 512);
        assert_eq!(seg.length(3), 476);
        assert_eq!(seg.offset(3), 1024);
    }

    #[test]
    fn single_segment_transfer() {
        let seg = Segmenter::new(100, 512).unwrap();
        assert_eq!(seg.num_segments(), 1);
        assert_eq!(seg.length(1), 100);
    }
}
