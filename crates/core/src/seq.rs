//! Wraparound-aware arithmetic on 16-bit RTP sequence numbers (RFC 3550 §A.1).
//!
//! Sequence numbers wrap at 65536, so `a > b` is meaningless for a long
//! running session. Two numbers are ordered by the sign of their wrapping
//! difference interpreted as `i16`: `b` is newer than `a` when it lies less
//! than half the sequence space ahead of it.

use std::cmp::Ordering;

/// Signed distance from `from` to `to`, in `-32768..=32767`.
pub fn distance(from: u16, to: u16) -> i16 {
    to.wrapping_sub(from) as i16
}

/// `true` if `a` comes strictly after `b`.
pub fn is_newer(a: u16, b: u16) -> bool {
    distance(b, a) > 0
}

/// Ordering of `a` relative to `b` in sequence space.
pub fn compare(a: u16, b: u16) -> Ordering {
    distance(b, a).cmp(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_without_wrap() {
        assert!(is_newer(101, 100));
        assert!(!is_newer(100, 101));
        assert!(!is_newer(100, 100));
    }

    #[test]
    fn newer_across_wrap() {
        assert!(is_newer(2, 65534));
        assert!(!is_newer(65534, 2));
        assert_eq!(distance(65534, 2), 4);
        assert_eq!(distance(2, 65534), -4);
    }

    #[test]
    fn compare_orders_across_wrap() {
        let mut seqs = vec![1u16, 65535, 0, 65534];
        seqs.sort_by(|a, b| compare(*a, *b));
        assert_eq!(seqs, vec![65534, 65535, 0, 1]);
    }
}
