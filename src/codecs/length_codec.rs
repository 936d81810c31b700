//! Bit-tree coding and the match-length sub-model.
//!
//! Lengths 2..273 are split into three ranges selected by two choice bits:
//! low (2..9) and mid (10..17) with per-pos-state 3-bit trees, and high
//! (18..273) with a shared 8-bit tree.

use std::io::{self, Write};

use super::range_codec::{BitModel, Price, RangeDecoder, RangeEncoder};
use super::{MATCH_LEN_MAX, MATCH_LEN_MIN, POS_STATES};
use crate::error::Result;

/// A probability tree over `SIZE = 2^k` symbols, walked root-first for
/// normal order or leaf-first for reversed (bit-by-bit) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTreeModel<const SIZE: usize> {
    probs: [BitModel; SIZE],
}

impl<const SIZE: usize> Default for BitTreeModel<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> BitTreeModel<SIZE> {
    pub fn new() -> Self {
        Self {
            probs: [BitModel::new(); SIZE],
        }
    }

    pub fn encode(&mut self, enc: &mut RangeEncoder<impl Write>, symbol: u32) -> io::Result<()> {
        debug_assert!(symbol < SIZE as u32);
        let mut index = 1usize;
        let mut mask = SIZE as u32;
        loop {
            mask >>= 1;
            let bit = symbol & mask;
            enc.encode_bit(&mut self.probs[index], bit)?;
            index <<= 1;
            if bit != 0 {
                index |= 1;
            }
            if mask == 1 {
                break;
            }
        }
        Ok(())
    }

    pub fn encode_reverse(
        &mut self,
        enc: &mut RangeEncoder<impl Write>,
        symbol: u32,
    ) -> io::Result<()> {
        debug_assert!(symbol < SIZE as u32);
        let mut index = 1usize;
        let mut symbol = symbol | SIZE as u32;
        loop {
            let bit = symbol & 1;
            symbol >>= 1;
            enc.encode_bit(&mut self.probs[index], bit)?;
            index = (index << 1) | bit as usize;
            if symbol == 1 {
                break;
            }
        }
        Ok(())
    }

    pub fn decode(&mut self, dec: &mut RangeDecoder<impl io::Read>) -> Result<u32> {
        let mut symbol = 1u32;
        loop {
            symbol = (symbol << 1) | dec.decode_bit(&mut self.probs[symbol as usize])?;
            if symbol >= SIZE as u32 {
                break;
            }
        }
        Ok(symbol - SIZE as u32)
    }

    pub fn decode_reverse(&mut self, dec: &mut RangeDecoder<impl io::Read>) -> Result<u32> {
        let mut index = 1u32;
        let mut result = 0u32;
        let mut shift = 0u32;
        loop {
            let bit = dec.decode_bit(&mut self.probs[index as usize])?;
            index = (index << 1) | bit;
            result |= bit << shift;
            shift += 1;
            if index >= SIZE as u32 {
                break;
            }
        }
        Ok(result)
    }

    pub fn price(&self, symbol: u32) -> Price {
        let mut price = Price::zero();
        let mut symbol = symbol | SIZE as u32;
        loop {
            let bit = symbol & 1;
            symbol >>= 1;
            price += self.probs[symbol as usize].price(bit);
            if symbol == 1 {
                break;
            }
        }
        price
    }

    pub fn reverse_price(&self, symbol: u32) -> Price {
        let mut price = Price::zero();
        let mut index = 1u32;
        let mut symbol = symbol | SIZE as u32;
        loop {
            let bit = symbol & 1;
            symbol >>= 1;
            price += self.probs[index as usize].price(bit);
            index = (index << 1) | bit;
            if symbol == 1 {
                break;
            }
        }
        price
    }
}

pub const LEN_LOW_BITS: usize = 3;
pub const LEN_MID_BITS: usize = 3;
pub const LEN_HIGH_BITS: usize = 8;
pub const LEN_LOW_SYMBOLS: usize = 1 << LEN_LOW_BITS;
pub const LEN_MID_SYMBOLS: usize = 1 << LEN_MID_BITS;
pub const LEN_HIGH_SYMBOLS: usize = 1 << LEN_HIGH_BITS;
pub const MAX_LEN_SYMBOLS: usize = LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + LEN_HIGH_SYMBOLS;

const PRICE_UPDATE_INTERVAL: i32 = 32;

/// The probability state of the length sub-model, shared by both halves.
#[derive(Debug, Clone)]
pub struct LenModel {
    choice1: BitModel,
    choice2: BitModel,
    low: [BitTreeModel<LEN_LOW_SYMBOLS>; POS_STATES],
    mid: [BitTreeModel<LEN_MID_SYMBOLS>; POS_STATES],
    high: BitTreeModel<LEN_HIGH_SYMBOLS>,
}

impl Default for LenModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LenModel {
    pub fn new() -> Self {
        Self {
            choice1: BitModel::new(),
            choice2: BitModel::new(),
            low: [BitTreeModel::new(); POS_STATES],
            mid: [BitTreeModel::new(); POS_STATES],
            high: BitTreeModel::new(),
        }
    }

    pub fn decode(&mut self, dec: &mut RangeDecoder<impl io::Read>, pos_state: usize) -> Result<u32> {
        if dec.decode_bit(&mut self.choice1)? == 0 {
            return Ok(self.low[pos_state].decode(dec)? + MATCH_LEN_MIN as u32);
        }
        if dec.decode_bit(&mut self.choice2)? == 0 {
            return Ok(self.mid[pos_state].decode(dec)?
                + (MATCH_LEN_MIN + LEN_LOW_SYMBOLS) as u32);
        }
        Ok(self.high.decode(dec)? + (MATCH_LEN_MIN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32)
    }

    pub fn encode(
        &mut self,
        enc: &mut RangeEncoder<impl Write>,
        len: u32,
        pos_state: usize,
    ) -> io::Result<()> {
        debug_assert!((MATCH_LEN_MIN as u32..=MATCH_LEN_MAX as u32).contains(&len));
        let mut len = len as usize - MATCH_LEN_MIN;
        if len < LEN_LOW_SYMBOLS {
            enc.encode_bit(&mut self.choice1, 0)?;
            return self.low[pos_state].encode(enc, len as u32);
        }
        enc.encode_bit(&mut self.choice1, 1)?;
        len -= LEN_LOW_SYMBOLS;
        if len < LEN_MID_SYMBOLS {
            enc.encode_bit(&mut self.choice2, 0)?;
            return self.mid[pos_state].encode(enc, len as u32);
        }
        enc.encode_bit(&mut self.choice2, 1)?;
        self.high.encode(enc, (len - LEN_MID_SYMBOLS) as u32)
    }
}

/// Encoder-side length model with a price cache per pos_state. Prices go
/// stale as the cells adapt; a per-pos-state counter forces a refresh
/// every [`PRICE_UPDATE_INTERVAL`] encoded lengths.
pub struct LenEncoder {
    model: LenModel,
    prices: Box<[[Price; MAX_LEN_SYMBOLS]; POS_STATES]>,
    counters: [i32; POS_STATES],
    /// Number of priced length symbols: match_len_limit - 1.
    priced_symbols: usize,
}

impl LenEncoder {
    pub fn new(match_len_limit: u32) -> Self {
        Self {
            model: LenModel::new(),
            prices: Box::new([[Price::zero(); MAX_LEN_SYMBOLS]; POS_STATES]),
            counters: [0; POS_STATES],
            priced_symbols: match_len_limit as usize - MATCH_LEN_MIN + 1,
        }
    }

    pub fn encode(
        &mut self,
        enc: &mut RangeEncoder<impl Write>,
        len: u32,
        pos_state: usize,
    ) -> io::Result<()> {
        self.counters[pos_state] -= 1;
        self.model.encode(enc, len, pos_state)
    }

    pub fn price(&self, len: u32, pos_state: usize) -> Price {
        self.prices[pos_state][len as usize - MATCH_LEN_MIN]
    }

    pub fn update_prices(&mut self) {
        for pos_state in 0..POS_STATES {
            if self.counters[pos_state] <= 0 {
                self.counters[pos_state] = PRICE_UPDATE_INTERVAL;
                self.update_pos_state_prices(pos_state);
            }
        }
    }

    fn update_pos_state_prices(&mut self, pos_state: usize) {
        let prices = &mut self.prices[pos_state];
        let choice1_zero = self.model.choice1.price(0);
        let choice1_one = self.model.choice1.price(1);
        let choice2_zero = self.model.choice2.price(0);
        let choice2_one = self.model.choice2.price(1);

        let end = self.priced_symbols.min(LEN_LOW_SYMBOLS);
        for i in 0..end {
            prices[i] = choice1_zero + self.model.low[pos_state].price(i as u32);
        }

        let end = self.priced_symbols.min(LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS);
        for i in LEN_LOW_SYMBOLS..end {
            prices[i] = choice1_one
                + choice2_zero
                + self.model.mid[pos_state].price((i - LEN_LOW_SYMBOLS) as u32);
        }

        for i in LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS..self.priced_symbols {
            prices[i] = choice1_one
                + choice2_one
                + self
                    .model
                    .high
                    .price((i - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS) as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decoder_for(buf: Vec<u8>) -> RangeDecoder<Cursor<Vec<u8>>> {
        let mut dec = RangeDecoder::new(Cursor::new(buf));
        dec.load(true).unwrap();
        dec
    }

    #[test]
    fn test_bit_tree_round_trip() {
        let mut buf = Vec::new();
        let mut model = BitTreeModel::<256>::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for i in 0..256 {
            model.encode(&mut encoder, i).unwrap();
        }
        encoder.flush().unwrap();

        let mut model = BitTreeModel::<256>::new();
        let mut decoder = decoder_for(buf);
        for i in 0..256 {
            assert_eq!(model.decode(&mut decoder).unwrap(), i);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_reverse_bit_tree_round_trip() {
        let mut buf = Vec::new();
        let mut model = BitTreeModel::<16>::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for i in 0..16 {
            model.encode_reverse(&mut encoder, i).unwrap();
        }
        encoder.flush().unwrap();

        let mut model = BitTreeModel::<16>::new();
        let mut decoder = decoder_for(buf);
        for i in 0..16 {
            assert_eq!(model.decode_reverse(&mut decoder).unwrap(), i);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_length_round_trip_all_lengths() {
        let mut buf = Vec::new();
        let mut encoder_model = LenEncoder::new(MATCH_LEN_MAX as u32);
        let mut encoder = RangeEncoder::new(&mut buf);
        let min = MATCH_LEN_MIN as u32;
        let max = MATCH_LEN_MAX as u32;
        for len in min..=max {
            encoder_model.encode(&mut encoder, len, 0).unwrap();
        }
        for len in (min..=max).rev() {
            encoder_model
                .encode(&mut encoder, len, (len & 3) as usize)
                .unwrap();
        }
        encoder.flush().unwrap();

        let mut model = LenModel::new();
        let mut decoder = decoder_for(buf);
        for len in min..=max {
            assert_eq!(model.decode(&mut decoder, 0).unwrap(), len);
        }
        for len in (min..=max).rev() {
            assert_eq!(model.decode(&mut decoder, (len & 3) as usize).unwrap(), len);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_price_cache_covers_limit() {
        let mut enc = LenEncoder::new(36);
        enc.update_prices();
        // Prices exist for every length up to the limit and are positive.
        for len in MATCH_LEN_MIN as u32..=36 {
            assert!(enc.price(len, 0) > Price::zero());
        }
    }
}
