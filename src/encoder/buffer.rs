//! The encoder's sliding input window.
//!
//! One circular buffer holds both the dictionary (bytes behind the read
//! head) and the lookahead (bytes ahead of it, not yet consumed by the
//! match finder). Appending is bounded so new data never overwrites bytes
//! still reachable as match sources.

use super::cyclic::CyclicBuffer;
use crate::codecs::MATCH_LEN_MAX;

/// Lookahead kept ahead of the read head. Larger values mean fewer refills
/// per encoded byte.
pub const LOOKAHEAD_SIZE: u32 = MATCH_LEN_MAX as u32 * 20;

/// Extra history kept behind the dictionary horizon. The encoding
/// position can lag the read head by a full trial window, and literals
/// there still reach `dictionary_size` bytes further back.
const BEFORE_SIZE: u32 = MATCH_LEN_MAX as u32 + 1;

pub struct WindowBuffer {
    buf: CyclicBuffer<u8>,
    /// Read head: absolute position of the next byte to be processed.
    head: u64,
    max_lookahead: u32,
}

impl WindowBuffer {
    pub fn new(dict_size: u32, max_lookahead: u32) -> Self {
        Self {
            buf: CyclicBuffer::new(
                dict_size as usize + BEFORE_SIZE as usize + max_lookahead as usize,
            ),
            head: 0,
            max_lookahead,
        }
    }

    /// Absolute position of the read head.
    pub fn pos(&self) -> u64 {
        self.head
    }

    /// Total bytes ever appended.
    pub fn total(&self) -> u64 {
        self.buf.pos()
    }

    /// Bytes ahead of the read head.
    pub fn forward_bytes(&self) -> usize {
        (self.buf.pos() - self.head) as usize
    }

    /// How much can be appended without clobbering reachable history.
    pub fn available_append(&self) -> usize {
        self.max_lookahead as usize - self.forward_bytes()
    }

    pub fn append(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.available_append());
        self.buf.push_slice(data);
    }

    pub fn increment_pos(&mut self) {
        debug_assert!(self.forward_bytes() > 0);
        self.head += 1;
    }

    /// Byte at `head + offset`. Offsets before the start of the data read
    /// as zero, matching the decoder's freshly zeroed dictionary.
    pub fn get_byte(&self, offset: i32) -> u8 {
        let abs = self.head as i64 + offset as i64;
        if abs < 0 {
            return 0;
        }
        self.buf.get(abs as u64)
    }

    /// Length of the match at `head + start` against the data `dist + 1`
    /// bytes behind it, up to `limit` bytes. `dist` is in stored form
    /// (actual distance minus one).
    pub fn match_length(&self, start: u32, dist: u32, limit: u32) -> u32 {
        // A match may not start before the beginning of the data.
        if (dist as u64 + 1) > self.head + start as u64 {
            return 0;
        }
        debug_assert!((start + limit) as usize <= self.forward_bytes());
        let mut len = 0;
        while len < limit {
            let off = (start + len) as i32;
            if self.get_byte(off) != self.get_byte(off - dist as i32 - 1) {
                break;
            }
            len += 1;
        }
        len
    }

    /// Starts a fresh window (new member); the storage is reused.
    pub fn reset(&mut self) {
        self.buf.reset();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with(data: &[u8]) -> WindowBuffer {
        let mut w = WindowBuffer::new(1 << 12, LOOKAHEAD_SIZE);
        w.append(data);
        w
    }

    #[test]
    fn test_byte_access_around_head() {
        let mut w = window_with(b"abcdef");
        assert_eq!(w.get_byte(0), b'a');
        assert_eq!(w.get_byte(5), b'f');
        w.increment_pos();
        w.increment_pos();
        assert_eq!(w.get_byte(0), b'c');
        assert_eq!(w.get_byte(-1), b'b');
        assert_eq!(w.get_byte(-2), b'a');
        // Before the data, the window reads as zeros.
        assert_eq!(w.get_byte(-3), 0);
    }

    #[test]
    fn test_match_length() {
        let mut w = window_with(b"abcabcabx");
        w.increment_pos();
        w.increment_pos();
        w.increment_pos();
        // head at second 'a'; distance 3 (stored 2) matches "abcab".
        assert_eq!(w.match_length(0, 2, 6), 5);
        // Offset variant: start comparing one byte in.
        assert_eq!(w.match_length(1, 2, 5), 4);
        // A distance reaching before the data start never matches.
        assert_eq!(w.match_length(0, 10, 5), 0);
    }

    #[test]
    fn test_forward_accounting() {
        let mut w = window_with(b"xyz");
        assert_eq!(w.forward_bytes(), 3);
        w.increment_pos();
        assert_eq!(w.forward_bytes(), 2);
        assert_eq!(w.pos(), 1);
        assert_eq!(w.total(), 3);
        assert_eq!(
            w.available_append(),
            LOOKAHEAD_SIZE as usize - 2
        );
    }
}
