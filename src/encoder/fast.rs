//! Greedy lazy-match instruction picker (compression level 0).
//!
//! Takes the longest candidate at each position, preferring repeated
//! distances when they are nearly as long, and defers by one literal
//! whenever the next position offers a clearly better match.

use crate::codecs::lzma::LzmaEncoder;
use crate::codecs::{MATCH_LEN_MAX, MATCH_LEN_MIN};

use super::match_finder::{Match, MatchFinder};
use super::{EncodeInstruction, EncoderInput, InstructionPicker};

pub struct FastPicker {
    nice_len: u32,
}

impl FastPicker {
    pub fn new(match_len_limit: u32) -> Self {
        Self {
            nice_len: match_len_limit,
        }
    }
}

/// True when `small` is so much closer than `big` that a shorter match at
/// `small` usually codes cheaper.
fn change_pair(small_dist: u32, big_dist: u32) -> bool {
    small_dist < big_dist / 128
}

impl<F: MatchFinder> InstructionPicker<F> for FastPicker {
    fn pick(&mut self, input: &mut EncoderInput<F>, model: &mut LzmaEncoder) -> EncodeInstruction {
        let avail = input.forward_bytes().min(MATCH_LEN_MAX) as u32;
        if avail < MATCH_LEN_MIN as u32 {
            return EncodeInstruction::Literal;
        }

        // Repeated distances first: a long-enough rep wins outright.
        let mut best_rep_len = 0;
        let mut best_rep_index = 0;
        for (i, &rep) in model.reps.iter().enumerate() {
            let len = input.buffer().match_length(0, rep, avail);
            if len < MATCH_LEN_MIN as u32 {
                continue;
            }
            if len >= self.nice_len {
                return EncodeInstruction::Rep { index: i, len };
            }
            if len > best_rep_len {
                best_rep_len = len;
                best_rep_index = i;
            }
        }

        let mut main_len = 0;
        let mut main_dist = 0;
        let matches = input.matches();
        if !matches.is_empty() {
            let main = *matches.last().unwrap();
            main_len = main.len;
            main_dist = main.distance;
            if main_len >= self.nice_len {
                return EncodeInstruction::Match(main);
            }
            // Swap in a slightly shorter match when its distance is far
            // closer; the saved distance bits beat the extra length bit.
            let mut i = matches.len() - 1;
            while i > 0 && main_len == matches[i - 1].len + 1 && change_pair(matches[i - 1].distance, main_dist)
            {
                i -= 1;
                main_len = matches[i].len;
                main_dist = matches[i].distance;
            }
            if main_len == MATCH_LEN_MIN as u32 && main_dist >= 0x80 {
                main_len = 0;
                main_dist = 0;
            }
        }

        if best_rep_len >= MATCH_LEN_MIN as u32
            && (best_rep_len + 1 >= main_len
                || (best_rep_len + 2 >= main_len && main_dist >= 1 << 9)
                || (best_rep_len + 3 >= main_len && main_dist >= 1 << 15))
        {
            return EncodeInstruction::Rep {
                index: best_rep_index,
                len: best_rep_len,
            };
        }

        if main_len < MATCH_LEN_MIN as u32 || avail <= MATCH_LEN_MIN as u32 {
            return EncodeInstruction::Literal;
        }

        // Lazy step: if the next position has a better match, emit a
        // literal now and keep the options open.
        input.advance();
        let next_matches = input.matches();
        if !next_matches.is_empty() {
            let next = *next_matches.last().unwrap();
            if (next.len >= main_len && next.distance < main_dist)
                || (next.len == main_len + 1 && !change_pair(main_dist, next.distance))
                || next.len > main_len + 1
                || (next.len + 1 >= main_len
                    && main_len >= MATCH_LEN_MIN as u32 + 1
                    && change_pair(next.distance, main_dist))
            {
                return EncodeInstruction::Literal;
            }
        }
        let limit = (main_len - 1).max(MATCH_LEN_MIN as u32);
        let next_avail = (input.forward_bytes() as u32).min(limit);
        for &rep in model.reps.iter() {
            if input.buffer().match_length(0, rep, next_avail) == limit {
                return EncodeInstruction::Literal;
            }
        }

        EncodeInstruction::Match(Match {
            len: main_len,
            distance: main_dist,
        })
    }

    fn reset(&mut self) {}
}
