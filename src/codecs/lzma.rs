//! The complete LZMA symbol model: match/rep selector bits, distance
//! slots, and the length and literal sub-models, in encoder and decoder
//! halves that update their probability cells in lockstep.

use std::io::{self, Read, Write};

use super::length_codec::{BitTreeModel, LenEncoder, LenModel};
use super::literal_codec::LiteralCodec;
use super::range_codec::{BitModel, Price, RangeDecoder, RangeEncoder};
use super::state::{State, STATES};
use super::{
    get_dist_slot, get_len_state, ALIGN_BITS, ALIGN_MASK, ALIGN_SIZE, DIST_MODEL_END,
    DIST_MODEL_START, DIST_SLOTS, DIST_STATES, FULL_DISTANCES, POS_STATES,
};
use crate::error::Result;

/// The distance value that signals a marker instead of a match.
pub const MARKER_DISTANCE: u32 = 0xFFFF_FFFF;

/// Mid-range distance trees, one per slot 4..13. The tree sizes follow
/// the footer-bit count of each slot.
type DistSpecial = (
    BitTreeModel<2>,
    BitTreeModel<2>,
    BitTreeModel<4>,
    BitTreeModel<4>,
    BitTreeModel<8>,
    BitTreeModel<8>,
    BitTreeModel<16>,
    BitTreeModel<16>,
    BitTreeModel<32>,
    BitTreeModel<32>,
);

fn new_dist_special() -> DistSpecial {
    (
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
        BitTreeModel::new(),
    )
}

/// Decoder-side model state for one member.
pub struct LzmaDecoder {
    pub state: State,
    pub reps: [u32; 4],
    pub is_match: [[BitModel; POS_STATES]; STATES],
    pub is_rep: [BitModel; STATES],
    pub is_rep0: [BitModel; STATES],
    pub is_rep1: [BitModel; STATES],
    pub is_rep2: [BitModel; STATES],
    pub is_rep0_long: [[BitModel; POS_STATES]; STATES],
    pub dist_slots: [BitTreeModel<DIST_SLOTS>; DIST_STATES],
    dist_special: DistSpecial,
    pub dist_align: BitTreeModel<ALIGN_SIZE>,
    pub literals: LiteralCodec,
    pub match_len: LenModel,
    pub rep_len: LenModel,
}

impl Default for LzmaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LzmaDecoder {
    pub fn new() -> Self {
        Self {
            state: State::new(),
            reps: [0; 4],
            is_match: [[BitModel::new(); POS_STATES]; STATES],
            is_rep: [BitModel::new(); STATES],
            is_rep0: [BitModel::new(); STATES],
            is_rep1: [BitModel::new(); STATES],
            is_rep2: [BitModel::new(); STATES],
            is_rep0_long: [[BitModel::new(); POS_STATES]; STATES],
            dist_slots: [BitTreeModel::new(); DIST_STATES],
            dist_special: new_dist_special(),
            dist_align: BitTreeModel::new(),
            literals: LiteralCodec::new(),
            match_len: LenModel::new(),
            rep_len: LenModel::new(),
        }
    }

    /// Decodes the distance of a fresh match of length `len`, or
    /// [`MARKER_DISTANCE`].
    pub fn decode_distance<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
        len: u32,
    ) -> Result<u32> {
        let slot = self.dist_slots[get_len_state(len)].decode(rc)?;
        if slot < DIST_MODEL_START {
            return Ok(slot);
        }
        let direct_bits = (slot >> 1) - 1;
        let mut distance = (2 | (slot & 1)) << direct_bits;
        if slot < DIST_MODEL_END {
            distance += self.decode_dist_special(rc, (slot - DIST_MODEL_START) as usize)?;
        } else {
            distance = distance
                .wrapping_add(rc.decode_direct_bits(direct_bits - ALIGN_BITS as u32)? << ALIGN_BITS);
            distance = distance.wrapping_add(self.dist_align.decode_reverse(rc)?);
        }
        Ok(distance)
    }

    fn decode_dist_special<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
        index: usize,
    ) -> Result<u32> {
        let probs = &mut self.dist_special;
        Ok(match index {
            0 => probs.0.decode_reverse(rc)?,
            1 => probs.1.decode_reverse(rc)?,
            2 => probs.2.decode_reverse(rc)?,
            3 => probs.3.decode_reverse(rc)?,
            4 => probs.4.decode_reverse(rc)?,
            5 => probs.5.decode_reverse(rc)?,
            6 => probs.6.decode_reverse(rc)?,
            7 => probs.7.decode_reverse(rc)?,
            8 => probs.8.decode_reverse(rc)?,
            _ => probs.9.decode_reverse(rc)?,
        })
    }
}

const DIST_PRICE_UPDATE_INTERVAL: i32 = FULL_DISTANCES as i32;
const ALIGN_PRICE_UPDATE_INTERVAL: i32 = ALIGN_SIZE as i32;

/// Encoder-side model state plus the cached prices the optimal parser
/// reads on every trial.
pub struct LzmaEncoder {
    pub state: State,
    pub reps: [u32; 4],
    is_match: [[BitModel; POS_STATES]; STATES],
    is_rep: [BitModel; STATES],
    is_rep0: [BitModel; STATES],
    is_rep1: [BitModel; STATES],
    is_rep2: [BitModel; STATES],
    is_rep0_long: [[BitModel; POS_STATES]; STATES],
    dist_slots: [BitTreeModel<DIST_SLOTS>; DIST_STATES],
    dist_special: DistSpecial,
    dist_align: BitTreeModel<ALIGN_SIZE>,
    literals: LiteralCodec,
    match_len: LenEncoder,
    rep_len: LenEncoder,

    dist_slot_prices: Vec<[Price; DIST_SLOTS]>,
    dist_slot_price_count: u32,
    full_dist_prices: [[Price; FULL_DISTANCES]; DIST_STATES],
    align_prices: [Price; ALIGN_SIZE],
    dist_price_counter: i32,
    align_price_counter: i32,
}

impl LzmaEncoder {
    pub fn new(dict_size: u32, match_len_limit: u32) -> Self {
        let dist_slot_price_count = get_dist_slot(dict_size - 1) + 1;
        Self {
            state: State::new(),
            reps: [0; 4],
            is_match: [[BitModel::new(); POS_STATES]; STATES],
            is_rep: [BitModel::new(); STATES],
            is_rep0: [BitModel::new(); STATES],
            is_rep1: [BitModel::new(); STATES],
            is_rep2: [BitModel::new(); STATES],
            is_rep0_long: [[BitModel::new(); POS_STATES]; STATES],
            dist_slots: [BitTreeModel::new(); DIST_STATES],
            dist_special: new_dist_special(),
            dist_align: BitTreeModel::new(),
            literals: LiteralCodec::new(),
            match_len: LenEncoder::new(match_len_limit),
            rep_len: LenEncoder::new(match_len_limit),

            dist_slot_prices: vec![[Price::zero(); DIST_SLOTS]; DIST_STATES],
            dist_slot_price_count,
            full_dist_prices: [[Price::zero(); FULL_DISTANCES]; DIST_STATES],
            align_prices: [Price::zero(); ALIGN_SIZE],
            dist_price_counter: 0,
            align_price_counter: 0,
        }
    }

    /// Emits one literal. `match_byte` is the byte `reps[0] + 1` behind
    /// the literal, used by the matched path after non-literal states.
    pub fn encode_literal<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        pos_state: usize,
        cur_byte: u8,
        prev_byte: u8,
        match_byte: u8,
    ) -> io::Result<()> {
        let state = self.state.get();
        rc.encode_bit(&mut self.is_match[state][pos_state], 0)?;
        if self.state.is_literal() {
            self.literals.encode_normal(rc, cur_byte, prev_byte)?;
        } else {
            self.literals.encode_matched(rc, cur_byte, prev_byte, match_byte)?;
        }
        self.state.update_literal();
        Ok(())
    }

    /// Emits a match with a fresh distance (stored form).
    pub fn encode_match<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        pos_state: usize,
        distance: u32,
        len: u32,
    ) -> io::Result<()> {
        let state = self.state.get();
        rc.encode_bit(&mut self.is_match[state][pos_state], 1)?;
        rc.encode_bit(&mut self.is_rep[state], 0)?;
        self.state.update_match();

        self.match_len.encode(rc, len, pos_state)?;
        let slot = get_dist_slot(distance);
        self.dist_slots[get_len_state(len)].encode(rc, slot)?;
        if slot >= DIST_MODEL_START {
            let direct_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << direct_bits;
            let reduced = distance.wrapping_sub(base);
            if slot < DIST_MODEL_END {
                self.encode_dist_special(rc, (slot - DIST_MODEL_START) as usize, reduced)?;
            } else {
                rc.encode_direct_bits(reduced >> ALIGN_BITS, direct_bits - ALIGN_BITS as u32)?;
                self.dist_align.encode_reverse(rc, reduced & ALIGN_MASK)?;
                self.align_price_counter -= 1;
            }
        }
        self.reps[3] = self.reps[2];
        self.reps[2] = self.reps[1];
        self.reps[1] = self.reps[0];
        self.reps[0] = distance;
        self.dist_price_counter -= 1;
        Ok(())
    }

    fn encode_dist_special<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        index: usize,
        symbol: u32,
    ) -> io::Result<()> {
        let probs = &mut self.dist_special;
        match index {
            0 => probs.0.encode_reverse(rc, symbol),
            1 => probs.1.encode_reverse(rc, symbol),
            2 => probs.2.encode_reverse(rc, symbol),
            3 => probs.3.encode_reverse(rc, symbol),
            4 => probs.4.encode_reverse(rc, symbol),
            5 => probs.5.encode_reverse(rc, symbol),
            6 => probs.6.encode_reverse(rc, symbol),
            7 => probs.7.encode_reverse(rc, symbol),
            8 => probs.8.encode_reverse(rc, symbol),
            _ => probs.9.encode_reverse(rc, symbol),
        }
    }

    /// Emits a repeated match; `len == 1` is the short-rep form.
    pub fn encode_rep<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        pos_state: usize,
        rep: usize,
        len: u32,
    ) -> io::Result<()> {
        let state = self.state.get();
        rc.encode_bit(&mut self.is_match[state][pos_state], 1)?;
        rc.encode_bit(&mut self.is_rep[state], 1)?;

        let rep_value = self.reps[rep];
        if rep == 0 {
            rc.encode_bit(&mut self.is_rep0[state], 0)?;
            rc.encode_bit(
                &mut self.is_rep0_long[state][pos_state],
                if len == 1 { 0 } else { 1 },
            )?;
        } else {
            rc.encode_bit(&mut self.is_rep0[state], 1)?;
            if rep == 1 {
                rc.encode_bit(&mut self.is_rep1[state], 0)?;
            } else {
                rc.encode_bit(&mut self.is_rep1[state], 1)?;
                rc.encode_bit(&mut self.is_rep2[state], rep as u32 - 2)?;
                if rep == 3 {
                    self.reps[3] = self.reps[2];
                }
                self.reps[2] = self.reps[1];
            }
            self.reps[1] = self.reps[0];
            self.reps[0] = rep_value;
        }

        if len == 1 {
            self.state.update_short_rep();
        } else {
            self.rep_len.encode(rc, len, pos_state)?;
            self.state.update_rep();
        }
        Ok(())
    }

    /// Emits the End-Of-Stream marker: a length-2 match at the marker
    /// distance.
    pub fn encode_eos<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        pos_state: usize,
    ) -> io::Result<()> {
        self.encode_match(rc, pos_state, MARKER_DISTANCE, 2)
    }

    // ----- prices -----

    /// Refreshes every stale price cache; cheap when nothing is stale.
    pub fn update_prices(&mut self) {
        if self.dist_price_counter <= 0 {
            self.update_dist_prices();
        }
        if self.align_price_counter <= 0 {
            self.update_align_prices();
        }
        self.match_len.update_prices();
        self.rep_len.update_prices();
    }

    fn update_dist_prices(&mut self) {
        self.dist_price_counter = DIST_PRICE_UPDATE_INTERVAL;

        for dist_state in 0..DIST_STATES {
            for slot in 0..self.dist_slot_price_count as usize {
                self.dist_slot_prices[dist_state][slot] =
                    self.dist_slots[dist_state].price(slot as u32);
            }
            for slot in DIST_MODEL_END as usize..self.dist_slot_price_count as usize {
                let count = (slot as u32 >> 1) - 1 - ALIGN_BITS as u32;
                self.dist_slot_prices[dist_state][slot] += Price::of_direct_bits(count);
            }
            for dist in 0..DIST_MODEL_START as usize {
                self.full_dist_prices[dist_state][dist] = self.dist_slot_prices[dist_state][dist];
            }
        }

        let mut dist = DIST_MODEL_START;
        for slot in DIST_MODEL_START..DIST_MODEL_END {
            let direct_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << direct_bits;
            let index = (slot - DIST_MODEL_START) as usize;
            for _ in 0..1u32 << direct_bits {
                let reduced = dist - base;
                let price = self.dist_special_reverse_price(index, reduced);
                for dist_state in 0..DIST_STATES {
                    self.full_dist_prices[dist_state][dist as usize] =
                        self.dist_slot_prices[dist_state][slot as usize] + price;
                }
                dist += 1;
            }
        }
        debug_assert_eq!(dist, FULL_DISTANCES as u32);
    }

    fn dist_special_reverse_price(&self, index: usize, symbol: u32) -> Price {
        let probs = &self.dist_special;
        match index {
            0 => probs.0.reverse_price(symbol),
            1 => probs.1.reverse_price(symbol),
            2 => probs.2.reverse_price(symbol),
            3 => probs.3.reverse_price(symbol),
            4 => probs.4.reverse_price(symbol),
            5 => probs.5.reverse_price(symbol),
            6 => probs.6.reverse_price(symbol),
            7 => probs.7.reverse_price(symbol),
            8 => probs.8.reverse_price(symbol),
            _ => probs.9.reverse_price(symbol),
        }
    }

    fn update_align_prices(&mut self) {
        self.align_price_counter = ALIGN_PRICE_UPDATE_INTERVAL;
        for i in 0..ALIGN_SIZE {
            self.align_prices[i] = self.dist_align.reverse_price(i as u32);
        }
    }

    /// Price of one literal, including the "not a match" selector bit.
    pub fn literal_price(
        &self,
        cur_byte: u8,
        match_byte: u8,
        prev_byte: u8,
        pos_state: usize,
        state: &State,
    ) -> Price {
        let packet = self.is_match[state.get()][pos_state].price(0);
        let value = if state.is_literal() {
            self.literals.normal_price(cur_byte, prev_byte)
        } else {
            self.literals.matched_price(cur_byte, prev_byte, match_byte)
        };
        packet + value
    }

    pub fn any_match_price(&self, state: &State, pos_state: usize) -> Price {
        self.is_match[state.get()][pos_state].price(1)
    }

    pub fn normal_match_price(&self, any_match: Price, state: &State) -> Price {
        any_match + self.is_rep[state.get()].price(0)
    }

    pub fn any_rep_price(&self, any_match: Price, state: &State) -> Price {
        any_match + self.is_rep[state.get()].price(1)
    }

    pub fn short_rep_price(&self, any_rep: Price, state: &State, pos_state: usize) -> Price {
        any_rep
            + self.is_rep0[state.get()].price(0)
            + self.is_rep0_long[state.get()][pos_state].price(0)
    }

    pub fn long_rep_price(&self, any_rep: Price, rep: usize, state: &State, pos_state: usize) -> Price {
        let s = state.get();
        let mut price = any_rep;
        if rep == 0 {
            price += self.is_rep0[s].price(0) + self.is_rep0_long[s][pos_state].price(1);
        } else {
            price += self.is_rep0[s].price(1);
            if rep == 1 {
                price += self.is_rep1[s].price(0);
            } else {
                price += self.is_rep1[s].price(1) + self.is_rep2[s].price(rep as u32 - 2);
            }
        }
        price
    }

    pub fn rep_len_price(&self, len: u32, pos_state: usize) -> Price {
        self.rep_len.price(len, pos_state)
    }

    pub fn long_rep_and_len_price(
        &self,
        rep: usize,
        len: u32,
        state: &State,
        pos_state: usize,
    ) -> Price {
        let any_match = self.any_match_price(state, pos_state);
        let any_rep = self.any_rep_price(any_match, state);
        self.long_rep_price(any_rep, rep, state, pos_state) + self.rep_len.price(len, pos_state)
    }

    /// Price of a fresh match; `normal_match` must come from
    /// [`normal_match_price`].
    ///
    /// [`normal_match_price`]: LzmaEncoder::normal_match_price
    pub fn match_and_len_price(
        &self,
        normal_match: Price,
        distance: u32,
        len: u32,
        pos_state: usize,
    ) -> Price {
        let mut price = normal_match + self.match_len.price(len, pos_state);
        let dist_state = get_len_state(len);
        if (distance as usize) < FULL_DISTANCES {
            price += self.full_dist_prices[dist_state][distance as usize];
        } else {
            // The slot price already includes the direct bits.
            let slot = get_dist_slot(distance);
            price += self.dist_slot_prices[dist_state][slot as usize]
                + self.align_prices[(distance & ALIGN_MASK) as usize];
        }
        price
    }
}
