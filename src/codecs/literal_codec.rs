//! Literal coding.
//!
//! Each literal is coded bit by bit through one of eight sub-coders chosen
//! by the top three bits of the previous byte. After a match the first
//! literal is coded against the byte the match would have produced, which
//! halves the cost of near-miss literals.

use std::io::{self, Read, Write};

use super::range_codec::{BitModel, Price, RangeDecoder, RangeEncoder};
use super::{get_lit_state, LITERAL_CONTEXTS};
use crate::error::Result;

/// Probability cells for one literal context: 0x100 for the plain tree
/// plus 2 x 0x100 for the matched paths.
#[derive(Debug, Clone)]
struct LiteralSubcoder {
    probs: [BitModel; 0x300],
}

impl LiteralSubcoder {
    fn new() -> Self {
        Self {
            probs: [BitModel::new(); 0x300],
        }
    }

    fn encode_normal(&mut self, rc: &mut RangeEncoder<impl Write>, symbol: u8) -> io::Result<()> {
        let mut symbol = symbol as u32 | 0x100;
        loop {
            let index = symbol >> 8;
            let bit = (symbol >> 7) & 1;
            rc.encode_bit(&mut self.probs[index as usize], bit)?;
            symbol <<= 1;
            if symbol >= 0x100 << 8 {
                break;
            }
        }
        Ok(())
    }

    fn encode_matched(
        &mut self,
        rc: &mut RangeEncoder<impl Write>,
        symbol: u8,
        match_byte: u8,
    ) -> io::Result<()> {
        let mut symbol = symbol as u32 | 0x100;
        let mut match_byte = match_byte as u32;
        let mut offset = 0x100u32;
        loop {
            match_byte <<= 1;
            let match_bit = match_byte & offset;
            let index = offset + match_bit + (symbol >> 8);
            let bit = (symbol >> 7) & 1;
            rc.encode_bit(&mut self.probs[index as usize], bit)?;
            symbol <<= 1;
            offset &= !(match_byte ^ symbol);
            if symbol >= 0x100 << 8 {
                break;
            }
        }
        Ok(())
    }

    fn decode_normal(&mut self, rc: &mut RangeDecoder<impl Read>) -> Result<u8> {
        let mut symbol = 1u32;
        loop {
            symbol = (symbol << 1) | rc.decode_bit(&mut self.probs[symbol as usize])?;
            if symbol >= 0x100 {
                break;
            }
        }
        Ok(symbol as u8)
    }

    fn decode_matched(&mut self, rc: &mut RangeDecoder<impl Read>, match_byte: u8) -> Result<u8> {
        let mut symbol = 1u32;
        let mut match_byte = match_byte as u32;
        let mut offset = 0x100u32;
        loop {
            match_byte <<= 1;
            let match_bit = match_byte & offset;
            let bit = rc.decode_bit(&mut self.probs[(offset + match_bit + symbol) as usize])?;
            symbol = (symbol << 1) | bit;
            offset &= 0u32.wrapping_sub(bit) ^ !match_bit;
            if symbol >= 0x100 {
                break;
            }
        }
        Ok(symbol as u8)
    }

    fn normal_price(&self, symbol: u8) -> Price {
        let mut price = Price::zero();
        let mut symbol = symbol as u32 | 0x100;
        loop {
            let index = symbol >> 8;
            let bit = (symbol >> 7) & 1;
            price += self.probs[index as usize].price(bit);
            symbol <<= 1;
            if symbol >= 0x100 << 8 {
                break;
            }
        }
        price
    }

    fn matched_price(&self, symbol: u8, match_byte: u8) -> Price {
        let mut price = Price::zero();
        let mut symbol = symbol as u32 | 0x100;
        let mut match_byte = match_byte as u32;
        let mut offset = 0x100u32;
        loop {
            match_byte <<= 1;
            let match_bit = match_byte & offset;
            let index = offset + match_bit + (symbol >> 8);
            let bit = (symbol >> 7) & 1;
            price += self.probs[index as usize].price(bit);
            symbol <<= 1;
            offset &= !(match_byte ^ symbol);
            if symbol >= 0x100 << 8 {
                break;
            }
        }
        price
    }
}

/// All eight literal contexts.
pub struct LiteralCodec {
    subcoders: [LiteralSubcoder; LITERAL_CONTEXTS],
}

impl Default for LiteralCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteralCodec {
    pub fn new() -> Self {
        Self {
            subcoders: std::array::from_fn(|_| LiteralSubcoder::new()),
        }
    }

    pub fn encode_normal(
        &mut self,
        rc: &mut RangeEncoder<impl Write>,
        symbol: u8,
        prev_byte: u8,
    ) -> io::Result<()> {
        self.subcoders[get_lit_state(prev_byte)].encode_normal(rc, symbol)
    }

    pub fn encode_matched(
        &mut self,
        rc: &mut RangeEncoder<impl Write>,
        symbol: u8,
        prev_byte: u8,
        match_byte: u8,
    ) -> io::Result<()> {
        self.subcoders[get_lit_state(prev_byte)].encode_matched(rc, symbol, match_byte)
    }

    pub fn decode_normal(&mut self, rc: &mut RangeDecoder<impl Read>, prev_byte: u8) -> Result<u8> {
        self.subcoders[get_lit_state(prev_byte)].decode_normal(rc)
    }

    pub fn decode_matched(
        &mut self,
        rc: &mut RangeDecoder<impl Read>,
        prev_byte: u8,
        match_byte: u8,
    ) -> Result<u8> {
        self.subcoders[get_lit_state(prev_byte)].decode_matched(rc, match_byte)
    }

    pub fn normal_price(&self, symbol: u8, prev_byte: u8) -> Price {
        self.subcoders[get_lit_state(prev_byte)].normal_price(symbol)
    }

    pub fn matched_price(&self, symbol: u8, prev_byte: u8, match_byte: u8) -> Price {
        self.subcoders[get_lit_state(prev_byte)].matched_price(symbol, match_byte)
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
    fn test_normal_literal_round_trip() {
        let mut buf = Vec::new();
        let mut codec = LiteralCodec::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        let mut prev = 0u8;
        for i in 0..=255u8 {
            codec.encode_normal(&mut encoder, i, prev).unwrap();
            prev = i;
        }
        encoder.flush().unwrap();

        let mut codec = LiteralCodec::new();
        let mut decoder = decoder_for(buf);
        let mut prev = 0u8;
        for i in 0..=255u8 {
            assert_eq!(codec.decode_normal(&mut decoder, prev).unwrap(), i);
            prev = i;
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_matched_literal_round_trip() {
        let match_byte = 0x7F;
        let mut buf = Vec::new();
        let mut codec = LiteralCodec::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for i in 0..=255u8 {
            codec
                .encode_matched(&mut encoder, i, 0x40, match_byte)
                .unwrap();
        }
        encoder.flush().unwrap();

        let mut codec = LiteralCodec::new();
        let mut decoder = decoder_for(buf);
        for i in 0..=255u8 {
            assert_eq!(
                codec.decode_matched(&mut decoder, 0x40, match_byte).unwrap(),
                i
            );
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_matched_literal_equal_to_match_byte_is_cheap() {
        let codec = LiteralCodec::new();
        // Coding the exact match byte only spends bits on agreement.
        let cheap = codec.matched_price(0x55, 0, 0x55);
        let expensive = codec.matched_price(0xAA, 0, 0x55);
        assert!(cheap < expensive);
    }
}
