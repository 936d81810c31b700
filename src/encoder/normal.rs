//! Price-based optimal-parsing instruction picker.
//!
//! For a window of trial positions the picker tracks, per position, the
//! cheapest way to reach it: literal, short rep, repeated match, fresh
//! match, or the combined forms (literal + rep0, match + literal + rep0).
//! When the window closes the cheapest chain is converted into a forward
//! list and handed out one instruction per call.

use crate::codecs::lzma::LzmaEncoder;
use crate::codecs::range_codec::Price;
use crate::codecs::state::State;
use crate::codecs::{MATCH_LEN_MAX, MATCH_LEN_MIN, POS_STATE_MASK};

use super::match_finder::{Match, MatchFinder};
use super::{EncodeInstruction, EncoderInput, InstructionPicker};

const REPS: usize = 4;
/// Size of the trial window: one slot per reachable length plus the
/// origin.
const OPTS: usize = MATCH_LEN_MAX + 1;

#[derive(Debug, Default, Clone)]
struct Optimum {
    state: State,
    reps: [u32; REPS],

    price: Price,
    opt_prev: usize,
    back_prev: i32,
    prev1_is_literal: bool,

    has_prev2: bool,
    opt_prev2: usize,
    back_prev2: i32,
}

impl Optimum {
    fn reset_price(&mut self) {
        self.price = Price::infinity();
    }

    /// Reached directly: literal (back -1), rep (0..3) or match (4+dist).
    fn set1(&mut self, price: Price, opt_cur: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur;
        self.back_prev = back;
        self.prev1_is_literal = false;
    }

    /// Reached as literal + rep/match.
    fn set2(&mut self, price: Price, opt_cur: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur + 1;
        self.back_prev = back;
        self.prev1_is_literal = true;
        self.has_prev2 = false;
    }

    /// Reached as match/rep + literal + rep0.
    fn set3(&mut self, price: Price, opt_cur: usize, back2: i32, len2: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur + len2 + 1;
        self.back_prev = back;
        self.prev1_is_literal = true;
        self.has_prev2 = true;
        self.opt_prev2 = opt_cur;
        self.back_prev2 = back2;
    }
}

fn translate(back: i32, len: u32) -> EncodeInstruction {
    if back == -1 {
        EncodeInstruction::Literal
    } else if back < REPS as i32 {
        EncodeInstruction::Rep {
            index: back as usize,
            len,
        }
    } else {
        EncodeInstruction::Match(Match {
            distance: (back - REPS as i32) as u32,
            len,
        })
    }
}

pub struct NormalPicker {
    nice_len: u32,
    opts: Vec<Optimum>,
    opt_cur: usize,
    opt_end: usize,
    matches_cache: Vec<Match>,
}

impl NormalPicker {
    pub fn new(match_len_limit: u32) -> Self {
        Self {
            nice_len: match_len_limit,
            opts: vec![Optimum::default(); OPTS],
            opt_cur: 0,
            opt_end: 0,
            matches_cache: Vec::new(),
        }
    }

    /// Rewrites the cheapest backward chain that ends at `opt_cur` into a
    /// forward list and returns the first hop.
    fn convert_opts(&mut self) -> (usize, i32) {
        self.opt_end = self.opt_cur;
        let mut opt_prev = self.opts[self.opt_cur].opt_prev;
        loop {
            let cur = self.opt_cur;
            if self.opts[cur].prev1_is_literal {
                self.opts[opt_prev].opt_prev = cur;
                self.opts[opt_prev].back_prev = -1;
                self.opt_cur = opt_prev;
                opt_prev -= 1;
                if self.opts[cur].has_prev2 {
                    self.opts[opt_prev].opt_prev = opt_prev + 1;
                    self.opts[opt_prev].back_prev = self.opts[cur].back_prev2;
                    self.opt_cur = opt_prev;
                    opt_prev = self.opts[cur].opt_prev2;
                }
            }
            let temp = self.opts[opt_prev].opt_prev;
            self.opts[opt_prev].opt_prev = self.opt_cur;
            self.opt_cur = opt_prev;
            opt_prev = temp;
            if self.opt_cur == 0 {
                break;
            }
        }
        self.opt_cur = self.opts[0].opt_prev;
        (self.opt_cur, self.opts[self.opt_cur].back_prev)
    }

    /// Recomputes the state and rep distances at `opt_cur` from the
    /// chain that reaches it, so later trials price correctly.
    fn update_opt_state_and_reps(&mut self) {
        let cur = self.opt_cur;
        let mut opt_prev = self.opts[cur].opt_prev;
        debug_assert!(opt_prev < cur);

        if self.opts[cur].prev1_is_literal {
            opt_prev -= 1;
            if self.opts[cur].has_prev2 {
                let state = self.opts[self.opts[cur].opt_prev2].state;
                self.opts[cur].state = state;
                if self.opts[cur].back_prev2 < REPS as i32 {
                    self.opts[cur].state.update_rep();
                } else {
                    self.opts[cur].state.update_match();
                }
            } else {
                let state = self.opts[opt_prev].state;
                self.opts[cur].state = state;
            }
            self.opts[cur].state.update_literal();
        } else {
            let state = self.opts[opt_prev].state;
            self.opts[cur].state = state;
        }

        if opt_prev == cur - 1 {
            // The previous hop was one byte: a short rep or a literal.
            debug_assert!(self.opts[cur].back_prev == 0 || self.opts[cur].back_prev == -1);
            if self.opts[cur].back_prev == 0 {
                self.opts[cur].state.update_short_rep();
            } else {
                self.opts[cur].state.update_literal();
            }
            self.opts[cur].reps = self.opts[opt_prev].reps;
        } else {
            let back;
            if self.opts[cur].prev1_is_literal && self.opts[cur].has_prev2 {
                opt_prev = self.opts[cur].opt_prev2;
                back = self.opts[cur].back_prev2;
                self.opts[cur].state.update_rep();
            } else {
                back = self.opts[cur].back_prev;
                if back < REPS as i32 {
                    self.opts[cur].state.update_rep();
                } else {
                    self.opts[cur].state.update_match();
                }
            }
            let prev_reps = self.opts[opt_prev].reps;
            if back < REPS as i32 {
                let b = back as usize;
                self.opts[cur].reps[0] = prev_reps[b];
                for r in 1..=b {
                    self.opts[cur].reps[r] = prev_reps[r - 1];
                }
                for r in b + 1..REPS {
                    self.opts[cur].reps[r] = prev_reps[r];
                }
            } else {
                self.opts[cur].reps[0] = (back - REPS as i32) as u32;
                self.opts[cur].reps[1..].copy_from_slice(&prev_reps[..REPS - 1]);
            }
        }
    }

    /// Prices the one-byte continuations at the current trial: literal,
    /// short rep, and literal + rep0.
    fn calc1_byte_prices<F: MatchFinder>(
        &mut self,
        input: &mut EncoderInput<F>,
        model: &LzmaEncoder,
        pos: u64,
        pos_state: usize,
        avail: i32,
        any_rep_price: Price,
    ) {
        let cur = self.opt_cur;
        let mut next_is_byte = false;
        let cur_byte = input.buffer().get_byte(0);
        let match_byte = input
            .buffer()
            .get_byte(-(self.opts[cur].reps[0] as i32) - 1);

        let literal_price = self.opts[cur].price
            + model.literal_price(
                cur_byte,
                match_byte,
                input.buffer().get_byte(-1),
                pos_state,
                &self.opts[cur].state,
            );
        if literal_price < self.opts[cur + 1].price {
            self.opts[cur + 1].set1(literal_price, cur, -1);
            next_is_byte = true;
        }

        if match_byte == cur_byte
            && !(self.opts[cur + 1].opt_prev == cur && self.opts[cur + 1].back_prev == 0)
        {
            let short_rep_price =
                model.short_rep_price(any_rep_price, &self.opts[cur].state, pos_state);
            if short_rep_price <= self.opts[cur + 1].price {
                self.opts[cur + 1].set1(short_rep_price, cur, 0);
                next_is_byte = true;
            }
        }

        // If neither one-byte form won, a literal followed by a rep0
        // match may still be the cheapest path forward.
        if !next_is_byte && match_byte != cur_byte && avail > MATCH_LEN_MIN as i32 {
            let len_limit = (self.nice_len as i32).min(avail - 1);
            let len = input
                .buffer()
                .match_length(1, self.opts[cur].reps[0], len_limit as u32);
            if len >= MATCH_LEN_MIN as u32 {
                let mut next_state = self.opts[cur].state;
                next_state.update_literal();
                let next_pos_state = ((pos + 1) & POS_STATE_MASK as u64) as usize;
                let price = literal_price
                    + model.long_rep_and_len_price(0, len, &next_state, next_pos_state);
                let index = cur + 1 + len as usize;
                while self.opt_end < index {
                    self.opt_end += 1;
                    self.opts[self.opt_end].reset_price();
                }
                if price < self.opts[index].price {
                    self.opts[index].set2(price, cur, 0);
                }
            }
        }
    }

    /// Prices every repeated-match continuation at the current trial,
    /// including rep + literal + rep0. Returns the first length a fresh
    /// match still has to beat.
    fn calc_long_rep_prices<F: MatchFinder>(
        &mut self,
        input: &mut EncoderInput<F>,
        model: &LzmaEncoder,
        pos: u64,
        pos_state: usize,
        avail: i32,
        any_rep_price: Price,
    ) -> usize {
        let cur = self.opt_cur;
        let mut start_len = MATCH_LEN_MIN;
        let len_limit = avail.min(self.nice_len as i32);

        for rep in 0..REPS {
            let len = input
                .buffer()
                .match_length(0, self.opts[cur].reps[rep], len_limit as u32);
            if len < MATCH_LEN_MIN as u32 {
                continue;
            }
            while self.opt_end < cur + len as usize {
                self.opt_end += 1;
                self.opts[self.opt_end].reset_price();
            }
            let long_rep_price =
                model.long_rep_price(any_rep_price, rep, &self.opts[cur].state, pos_state);
            for i in (MATCH_LEN_MIN..=len as usize).rev() {
                let price = long_rep_price + model.rep_len_price(i as u32, pos_state);
                if price < self.opts[cur + i].price {
                    self.opts[cur + i].set1(price, cur, rep as i32);
                }
            }
            if rep == 0 {
                start_len = len as usize + 1;
            }

            let len2_limit = (self.nice_len as i32).min(avail - len as i32 - 1);
            if len2_limit >= MATCH_LEN_MIN as i32 {
                let len2 =
                    input
                        .buffer()
                        .match_length(len + 1, self.opts[cur].reps[rep], len2_limit as u32);
                if len2 >= MATCH_LEN_MIN as u32 {
                    let mut price = long_rep_price + model.rep_len_price(len, pos_state);
                    let mut next_state = self.opts[cur].state;
                    next_state.update_rep();

                    let cur_byte = input.buffer().get_byte(len as i32);
                    let match_byte = input.buffer().get_byte(0);
                    let prev_byte = input.buffer().get_byte(len as i32 - 1);
                    let lit_pos_state = ((pos + len as u64) & POS_STATE_MASK as u64) as usize;
                    price += model.literal_price(
                        cur_byte,
                        match_byte,
                        prev_byte,
                        lit_pos_state,
                        &next_state,
                    );
                    next_state.update_literal();

                    let next_pos_state =
                        ((pos + len as u64 + 1) & POS_STATE_MASK as u64) as usize;
                    price += model.long_rep_and_len_price(0, len2, &next_state, next_pos_state);

                    let index = cur + len as usize + 1 + len2 as usize;
                    while self.opt_end < index {
                        self.opt_end += 1;
                        self.opts[self.opt_end].reset_price();
                    }
                    if price < self.opts[index].price {
                        self.opts[index].set3(price, cur, rep as i32, len as usize, 0);
                    }
                }
            }
        }
        start_len
    }

    /// Prices fresh-match continuations of every length from `start_len`
    /// up, including match + literal + rep0.
    fn calc_normal_match_prices<F: MatchFinder>(
        &mut self,
        input: &mut EncoderInput<F>,
        model: &LzmaEncoder,
        pos: u64,
        pos_state: usize,
        avail: i32,
        any_match_price: Price,
        start_len: u32,
    ) {
        let cur = self.opt_cur;
        {
            let matches = input.matches();
            self.matches_cache.clear();
            self.matches_cache.extend_from_slice(matches);
        }
        let mut count = self.matches_cache.len();
        if count == 0 {
            return;
        }
        // Matches reaching past the window are cut at the window edge.
        if self.matches_cache[count - 1].len as i32 > avail {
            let mut i = 0;
            while (self.matches_cache[i].len as i32) < avail {
                i += 1;
            }
            self.matches_cache[i].len = avail as u32;
            count = i + 1;
        }
        if self.matches_cache[count - 1].len < start_len {
            return;
        }
        while self.opt_end < cur + self.matches_cache[count - 1].len as usize {
            self.opt_end += 1;
            self.opts[self.opt_end].reset_price();
        }

        let normal_match_price =
            model.normal_match_price(any_match_price, &self.opts[cur].state);

        let mut m = 0;
        while start_len > self.matches_cache[m].len {
            m += 1;
        }
        let mut len = start_len;
        loop {
            let dist = self.matches_cache[m].distance;
            let price = model.match_and_len_price(normal_match_price, dist, len, pos_state);
            if price < self.opts[cur + len as usize].price {
                self.opts[cur + len as usize].set1(price, cur, dist as i32 + REPS as i32);
            }

            if len == self.matches_cache[m].len {
                // At a candidate's full length, also try
                // match + literal + rep0.
                let len2_limit = (self.nice_len as i32).min(avail - len as i32 - 1);
                if len2_limit >= MATCH_LEN_MIN as i32 {
                    let len2 = input.buffer().match_length(len + 1, dist, len2_limit as u32);
                    if len2 >= MATCH_LEN_MIN as u32 {
                        let mut next_state = self.opts[cur].state;
                        next_state.update_match();

                        let cur_byte = input.buffer().get_byte(len as i32);
                        let match_byte = input.buffer().get_byte(0);
                        let prev_byte = input.buffer().get_byte(len as i32 - 1);
                        let lit_pos_state =
                            ((pos + len as u64) & POS_STATE_MASK as u64) as usize;
                        let mut price2 = price
                            + model.literal_price(
                                cur_byte,
                                match_byte,
                                prev_byte,
                                lit_pos_state,
                                &next_state,
                            );
                        next_state.update_literal();

                        let next_pos_state =
                            ((pos + len as u64 + 1) & POS_STATE_MASK as u64) as usize;
                        price2 +=
                            model.long_rep_and_len_price(0, len2, &next_state, next_pos_state);

                        let index = cur + len as usize + 1 + len2 as usize;
                        while self.opt_end < index {
                            self.opt_end += 1;
                            self.opts[self.opt_end].reset_price();
                        }
                        if price2 < self.opts[index].price {
                            self.opts[index].set3(
                                price2,
                                cur,
                                dist as i32 + REPS as i32,
                                len as usize,
                                0,
                            );
                        }
                    }
                }
                m += 1;
                if m == count {
                    break;
                }
            }
            len += 1;
        }
    }
}

impl<F: MatchFinder> InstructionPicker<F> for NormalPicker {
    fn pick(&mut self, input: &mut EncoderInput<F>, model: &mut LzmaEncoder) -> EncodeInstruction {
        // Hand out instructions converted by an earlier parse first.
        if self.opt_cur < self.opt_end {
            let next = self.opts[self.opt_cur].opt_prev;
            let len = (next - self.opt_cur) as u32;
            self.opt_cur = next;
            return translate(self.opts[next].back_prev, len);
        }
        self.opt_cur = 0;
        self.opt_end = 0;

        let mut avail = input.forward_bytes().min(MATCH_LEN_MAX) as i32;
        if avail < MATCH_LEN_MIN as i32 {
            return EncodeInstruction::Literal;
        }

        let mut rep_lens = [0i32; REPS];
        let mut rep_best = 0;
        for rep in 0..REPS {
            rep_lens[rep] =
                input.buffer().match_length(0, model.reps[rep], avail as u32) as i32;
            if rep_lens[rep] < MATCH_LEN_MIN as i32 {
                rep_lens[rep] = 0;
                continue;
            }
            if rep_lens[rep] > rep_lens[rep_best] {
                rep_best = rep;
            }
        }
        if rep_lens[rep_best] >= self.nice_len as i32 {
            return EncodeInstruction::Rep {
                index: rep_best,
                len: rep_lens[rep_best] as u32,
            };
        }

        let mut main_len = 0u32;
        {
            let matches = input.matches();
            if !matches.is_empty() {
                let last = *matches.last().unwrap();
                main_len = last.len;
                if main_len >= self.nice_len {
                    return EncodeInstruction::Match(last);
                }
            }
        }

        let cur_byte = input.buffer().get_byte(0);
        let match_byte = input.buffer().get_byte(-(model.reps[0] as i32) - 1);
        if main_len < MATCH_LEN_MIN as u32
            && cur_byte != match_byte
            && rep_lens[rep_best] < MATCH_LEN_MIN as i32
        {
            return EncodeInstruction::Literal;
        }

        let mut pos = input.pos();
        let mut pos_state = (pos & POS_STATE_MASK as u64) as usize;

        {
            let prev_byte = input.buffer().get_byte(-1);
            let literal_price =
                model.literal_price(cur_byte, match_byte, prev_byte, pos_state, &model.state);
            self.opts[1].set1(literal_price, 0, -1);
        }

        let any_match_price = model.any_match_price(&model.state, pos_state);
        let any_rep_price = model.any_rep_price(any_match_price, &model.state);

        if match_byte == cur_byte {
            let short_rep_price = model.short_rep_price(any_rep_price, &model.state, pos_state);
            if short_rep_price < self.opts[1].price {
                self.opts[1].set1(short_rep_price, 0, 0);
            }
        }

        self.opt_end = (main_len as usize).max(rep_lens[rep_best] as usize);
        if self.opt_end < MATCH_LEN_MIN {
            debug_assert_eq!(self.opt_end, 0);
            let back = self.opts[1].back_prev;
            return if back == 0 {
                EncodeInstruction::Rep { index: 0, len: 1 }
            } else {
                EncodeInstruction::Literal
            };
        }

        model.update_prices();

        self.opts[0].state = model.state;
        self.opts[0].reps = model.reps;
        self.opts[0].price = Price::zero();
        for i in (MATCH_LEN_MIN..=self.opt_end).rev() {
            self.opts[i].reset_price();
        }

        // Repeated matches of every length reachable from the origin.
        for rep in 0..REPS {
            if rep_lens[rep] < MATCH_LEN_MIN as i32 {
                continue;
            }
            let long_rep_price =
                model.long_rep_price(any_rep_price, rep, &model.state, pos_state);
            let mut len = rep_lens[rep] as usize;
            loop {
                let price = long_rep_price + model.rep_len_price(len as u32, pos_state);
                if price < self.opts[len].price {
                    self.opts[len].set1(price, 0, rep as i32);
                }
                len -= 1;
                if len < MATCH_LEN_MIN {
                    break;
                }
            }
        }

        // Fresh matches longer than the rep0 continuation.
        {
            let start = (rep_lens[0] + 1).max(MATCH_LEN_MIN as i32);
            if start <= main_len as i32 {
                let normal_match_price = model.normal_match_price(any_match_price, &model.state);
                let matches = input.matches();
                let mut i = 0;
                while start > matches[i].len as i32 {
                    i += 1;
                }
                let mut len = start;
                loop {
                    let dist = matches[i].distance;
                    let price = model.match_and_len_price(
                        normal_match_price,
                        dist,
                        len as u32,
                        pos_state,
                    );
                    if price < self.opts[len as usize].price {
                        self.opts[len as usize].set1(price, 0, dist as i32 + REPS as i32);
                    }
                    if len == matches[i].len as i32 {
                        i += 1;
                        if i == matches.len() {
                            break;
                        }
                    }
                    len += 1;
                }
            }
        }

        avail = (input.forward_bytes() as i32).min(OPTS as i32 - 1);

        // Walk the trial window, pricing the continuations of every
        // position the cheapest chains can reach.
        loop {
            self.opt_cur += 1;
            if self.opt_cur >= self.opt_end {
                break;
            }
            input.advance();
            {
                let matches = input.matches();
                if !matches.is_empty() && matches.last().unwrap().len >= self.nice_len {
                    break;
                }
            }
            avail -= 1;
            pos += 1;
            pos_state = (pos & POS_STATE_MASK as u64) as usize;

            self.update_opt_state_and_reps();
            let any_match_price = self.opts[self.opt_cur].price
                + model.any_match_price(&self.opts[self.opt_cur].state, pos_state);
            let any_rep_price = model.any_rep_price(any_match_price, &self.opts[self.opt_cur].state);

            self.calc1_byte_prices(input, model, pos, pos_state, avail, any_rep_price);

            if avail >= MATCH_LEN_MIN as i32 {
                let start_len =
                    self.calc_long_rep_prices(input, model, pos, pos_state, avail, any_rep_price);
                if !input.matches().is_empty() {
                    self.calc_normal_match_prices(
                        input,
                        model,
                        pos,
                        pos_state,
                        avail,
                        any_match_price,
                        start_len as u32,
                    );
                }
            }
        }

        let (len, back) = self.convert_opts();
        translate(back, len as u32)
    }

    fn reset(&mut self) {
        self.opt_cur = 0;
        self.opt_end = 0;
    }
}
