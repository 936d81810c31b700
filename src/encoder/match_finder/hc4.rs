//! Hash-chain match finder for the fast encoder.
//!
//! Positions sharing a 4-byte hash form a singly linked chain through a
//! cyclic table; a bounded walk down the chain looks for longer matches
//! while the 2- and 3-byte hashes supply the short immediate candidates.

use super::super::buffer::WindowBuffer;
use super::{Hash234, Match, MatchFinder, MAX_POS, normalize_entries};

pub struct Hc4MatchFinder {
    hash: Hash234,
    chain: Box<[u32]>,
    cyclic_size: u32,
    cyclic_pos: u32,
    lz_pos: u32,
    depth: i32,
    nice_len: u32,
    match_len_limit: u32,
}

impl Hc4MatchFinder {
    pub fn new(dict_size: u32, match_len_limit: u32) -> Self {
        let cyclic_size = dict_size + 1;
        Self {
            hash: Hash234::new(dict_size),
            chain: vec![0u32; cyclic_size as usize].into_boxed_slice(),
            cyclic_size,
            cyclic_pos: cyclic_size - 1,
            lz_pos: cyclic_size,
            depth: 4 + match_len_limit as i32 / 4,
            nice_len: match_len_limit,
            match_len_limit,
        }
    }

    fn move_pos(&mut self) {
        self.cyclic_pos += 1;
        if self.cyclic_pos == self.cyclic_size {
            self.cyclic_pos = 0;
        }
        self.lz_pos += 1;
        if self.lz_pos == MAX_POS {
            let offset = self.lz_pos - self.cyclic_size;
            self.hash.normalize(offset);
            normalize_entries(&mut self.chain, offset);
            self.lz_pos = self.cyclic_size;
        }
    }

    fn chain_slot(&self, delta: u32) -> usize {
        let slot = if delta > self.cyclic_pos {
            self.cyclic_pos + self.cyclic_size - delta
        } else {
            self.cyclic_pos - delta
        };
        slot as usize
    }
}

impl MatchFinder for Hc4MatchFinder {
    fn matches(&mut self, buf: &WindowBuffer, out: &mut Vec<Match>) {
        out.clear();
        let avail = buf.forward_bytes() as u32;
        self.move_pos();

        let mut match_len_limit = self.match_len_limit;
        let mut nice_len_limit = self.nice_len;
        if avail < match_len_limit {
            if avail < 4 {
                self.chain[self.cyclic_pos as usize] = 0;
                return;
            }
            match_len_limit = avail;
            if nice_len_limit > avail {
                nice_len_limit = avail;
            }
        }

        self.hash.calc_hashes(buf);
        let mut delta2 = self.lz_pos.wrapping_sub(self.hash.hash2_entry());
        let delta3 = self.lz_pos.wrapping_sub(self.hash.hash3_entry());
        let mut current_match = self.hash.hash4_entry();
        self.hash.update_tables(self.lz_pos);
        self.chain[self.cyclic_pos as usize] = current_match;

        let mut len_best = 0u32;

        // The short hashes collide often, so the claimed prefix is
        // verified byte for byte before a candidate is accepted.
        if delta2 < self.cyclic_size
            && buf.get_byte(-(delta2 as i32)) == buf.get_byte(0)
            && buf.get_byte(1 - delta2 as i32) == buf.get_byte(1)
        {
            len_best = 2;
            out.push(Match { len: 2, distance: delta2 - 1 });
        }
        if delta2 != delta3
            && delta3 < self.cyclic_size
            && buf.get_byte(-(delta3 as i32)) == buf.get_byte(0)
            && buf.get_byte(1 - delta3 as i32) == buf.get_byte(1)
            && buf.get_byte(2 - delta3 as i32) == buf.get_byte(2)
        {
            len_best = 3;
            delta2 = delta3;
            out.push(Match { len: 3, distance: delta3 - 1 });
        }
        if !out.is_empty() {
            while len_best < match_len_limit
                && buf.get_byte(len_best as i32 - delta2 as i32) == buf.get_byte(len_best as i32)
            {
                len_best += 1;
            }
            out.last_mut().unwrap().len = len_best;
            if len_best >= nice_len_limit {
                return;
            }
        }
        if len_best < 3 {
            len_best = 3;
        }

        let mut depth = self.depth;
        loop {
            let delta = self.lz_pos.wrapping_sub(current_match);
            if depth == 0 || delta >= self.cyclic_size {
                break;
            }
            depth -= 1;
            let next = self.chain[self.chain_slot(delta)];

            // Quick filter on the first byte and the byte that would beat
            // the current best before doing the full comparison.
            if buf.get_byte(len_best as i32 - delta as i32) == buf.get_byte(len_best as i32)
                && buf.get_byte(-(delta as i32)) == buf.get_byte(0)
            {
                let len = buf.match_length(0, delta - 1, match_len_limit);
                if len > len_best {
                    len_best = len;
                    out.push(Match { len, distance: delta - 1 });
                    if len >= nice_len_limit {
                        return;
                    }
                }
            }
            current_match = next;
        }
    }

    fn skip(&mut self, buf: &WindowBuffer) {
        let avail = buf.forward_bytes() as u32;
        self.move_pos();
        if avail < 4 {
            self.chain[self.cyclic_pos as usize] = 0;
            return;
        }
        self.hash.calc_hashes(buf);
        let current_match = self.hash.hash4_entry();
        self.hash.update_tables(self.lz_pos);
        self.chain[self.cyclic_pos as usize] = current_match;
    }

    fn reset(&mut self) {
        self.hash.reset();
        self.chain.fill(0);
        self.cyclic_pos = self.cyclic_size - 1;
        self.lz_pos = self.cyclic_size;
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::window_with;
    use super::*;

    #[test]
    fn test_short_matches_found() {
        let mut data = vec![0u8; 64];
        for i in 0..10u8 {
            data.push(255);
            data.push(i);
            data.extend_from_slice(&[0; 10]);
        }
        for i in 0..10u8 {
            data.push(255);
            data.push(i);
            data.extend_from_slice(&[0; 10]);
        }
        let mut buf = window_with(&data, 1 << 12);
        let mut finder = Hc4MatchFinder::new(1 << 12, 16);
        let mut out = Vec::new();
        let mut found_any = false;
        while buf.forward_bytes() > 4 {
            finder.matches(&buf, &mut out);
            for m in &out {
                assert_eq!(buf.match_length(0, m.distance, m.len), m.len);
            }
            if buf.get_byte(0) == 255 && buf.pos() > 130 {
                // The same two-byte pair appeared 120 bytes earlier.
                found_any |= !out.is_empty();
            }
            buf.increment_pos();
        }
        assert!(found_any);
    }

    #[test]
    fn test_long_match_via_chain() {
        let mut data = Vec::new();
        data.extend_from_slice(b"a long repeated sequence here!");
        data.extend_from_slice(b"...filler...");
        data.extend_from_slice(b"a long repeated sequence here!");
        data.extend_from_slice(b"end.");
        let mut buf = window_with(&data, 1 << 12);
        let mut finder = Hc4MatchFinder::new(1 << 12, 30);
        let mut out = Vec::new();
        let second_start = 30 + 12;
        let mut best_at_repeat = 0;
        while buf.forward_bytes() > 4 {
            finder.matches(&buf, &mut out);
            if buf.pos() == second_start as u64 {
                best_at_repeat = out.last().map(|m| m.len).unwrap_or(0);
            }
            buf.increment_pos();
        }
        // The full repetition is found at the start of the second copy,
        // capped by the nice length.
        assert_eq!(best_at_repeat, 30);
    }
}
