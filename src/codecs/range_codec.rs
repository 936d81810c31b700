//! Range coding over adaptive binary probabilities.
//!
//! The encoder narrows a 32-bit range according to each bit's probability
//! and emits the settled high bytes through a carry-propagating cache. The
//! decoder mirrors it: a 32-bit `code` register tracks the encoder's `low`
//! and is refilled one byte at a time whenever the range drops below 2^24.
//!
//! The decoder also owns the buffered input stream for the whole file, so
//! it can hand out raw bytes for headers and trailers and account for the
//! exact number of bytes each member consumed.

mod price;
mod probability;

pub use price::Price;
pub use probability::BitModel;

use std::io::{self, ErrorKind, Read, Write};

use crate::error::{Error, Result};

pub const BIT_MODEL_TOTAL_BITS: u32 = 11;
pub const BIT_MODEL_TOTAL: u32 = 1 << BIT_MODEL_TOTAL_BITS;
pub const MOVE_BITS: u32 = 5;

const SHIFT_BITS: u32 = 8;
const TOP_MASK: u32 = 0xFF00_0000;

pub struct RangeEncoder<W: Write> {
    low: u64,
    range: u32,
    cache_size: u64,
    cache: u8,
    out: W,
    bytes_written: u64,
}

impl<W: Write> RangeEncoder<W> {
    pub fn new(out: W) -> Self {
        Self {
            low: 0,
            range: 0xFFFF_FFFF,
            cache_size: 1,
            cache: 0,
            out,
            bytes_written: 0,
        }
    }

    /// Bytes emitted since construction or the last [`reset_member`].
    ///
    /// [`reset_member`]: RangeEncoder::reset_member
    pub fn member_position(&self) -> u64 {
        self.bytes_written
    }

    /// Reinitialises the coder registers and the member byte count.
    /// Only valid at a member boundary, after [`flush`].
    ///
    /// [`flush`]: RangeEncoder::flush
    pub fn reset_member(&mut self) {
        self.low = 0;
        self.range = 0xFFFF_FFFF;
        self.cache_size = 1;
        self.cache = 0;
        self.bytes_written = 0;
    }

    pub fn inner(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes bytes around the coded stream (header, trailer). Only valid
    /// at a member boundary; the bytes count toward the member position.
    pub fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.out.write_all(&[byte])?;
        self.bytes_written += 1;
        Ok(())
    }

    fn shift_low(&mut self) -> io::Result<()> {
        let low_hi = (self.low >> 32) as u32;
        if low_hi != 0 || self.low < 0xFF00_0000 {
            let mut pending = self.cache;
            loop {
                self.write_byte((pending as u32 + low_hi) as u8)?;
                pending = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << SHIFT_BITS;
        Ok(())
    }

    pub fn encode_bit(&mut self, prob: &mut BitModel, bit: u32) -> io::Result<()> {
        let bound = (self.range >> BIT_MODEL_TOTAL_BITS) * prob.0 as u32;
        if bit == 0 {
            self.range = bound;
            prob.update_0();
        } else {
            self.low += bound as u64;
            self.range -= bound;
            prob.update_1();
        }
        if self.range & TOP_MASK == 0 {
            self.range <<= SHIFT_BITS;
            self.shift_low()?;
        }
        Ok(())
    }

    /// Encodes `count` bits of `value`, high bit first, without a model.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) -> io::Result<()> {
        let mut count = count;
        loop {
            self.range >>= 1;
            count -= 1;
            let bit = (value >> count) & 1;
            let mask = 0u32.wrapping_sub(bit);
            self.low += (self.range & mask) as u64;
            if self.range & TOP_MASK == 0 {
                self.range <<= SHIFT_BITS;
                self.shift_low()?;
            }
            if count == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Pushes the remaining state of `low` out; ends the member's coded
    /// stream at a byte boundary.
    pub fn flush(&mut self) -> io::Result<()> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        Ok(())
    }
}

const RD_BUFFER_SIZE: usize = 65536;

/// Range decoder plus the buffered input stream it feeds from.
pub struct RangeDecoder<R: Read> {
    reader: R,
    buffer: Box<[u8]>,
    pos: usize,
    stream_pos: usize,
    at_stream_end: bool,
    consumed_before_buffer: u64,
    member_start: u64,
    code: u32,
    range: u32,
}

impl<R: Read> RangeDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0u8; RD_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            stream_pos: 0,
            at_stream_end: false,
            consumed_before_buffer: 0,
            member_start: 0,
            code: 0,
            range: 0xFFFF_FFFF,
        }
    }

    /// Refills the buffer, retrying interrupted reads. A short fill marks
    /// the end of the stream.
    fn read_block(&mut self) -> Result<bool> {
        if !self.at_stream_end {
            self.consumed_before_buffer += self.pos as u64;
            self.pos = 0;
            let mut filled = 0;
            while filled < self.buffer.len() {
                match self.reader.read(&mut self.buffer[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(Error::Io(e)),
                }
            }
            self.at_stream_end = filled < self.buffer.len();
            self.stream_pos = filled;
        }
        Ok(self.pos < self.stream_pos)
    }

    /// True once every input byte has been consumed.
    pub fn finished(&mut self) -> Result<bool> {
        if self.pos < self.stream_pos {
            return Ok(false);
        }
        Ok(!self.read_block()?)
    }

    fn get_byte(&mut self) -> Result<u8> {
        // Filler keeps the registers moving if a member is truncated; the
        // caller notices EOF through finished().
        if self.finished()? {
            return Ok(0xAA);
        }
        let byte = self.buffer[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Raw buffered read for headers and trailers; returns the number of
    /// bytes actually available.
    pub fn read_data(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut sz = 0;
        while sz < out.len() && !self.finished()? {
            let n = (out.len() - sz).min(self.stream_pos - self.pos);
            out[sz..sz + n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
            self.pos += n;
            sz += n;
        }
        Ok(sz)
    }

    /// Bytes consumed since the last [`reset_member_position`].
    ///
    /// [`reset_member_position`]: RangeDecoder::reset_member_position
    pub fn member_position(&self) -> u64 {
        self.consumed_before_buffer + self.pos as u64 - self.member_start
    }

    pub fn reset_member_position(&mut self) {
        self.member_start = self.consumed_before_buffer + self.pos as u64;
    }

    /// Primes the registers from the stream: one marking byte (must be
    /// zero unless ignored) and four code bytes.
    pub fn load(&mut self, ignore_marking: bool) -> Result<()> {
        self.code = 0;
        self.range = 0xFFFF_FFFF;
        let first = self.get_byte()?;
        for _ in 0..4 {
            self.code = (self.code << 8) | self.get_byte()? as u32;
        }
        if first != 0 && !ignore_marking {
            return Err(Error::MarkedMember);
        }
        Ok(())
    }

    pub fn normalize(&mut self) -> Result<()> {
        if self.range <= 0x00FF_FFFF {
            self.range <<= SHIFT_BITS;
            self.code = (self.code << 8) | self.get_byte()? as u32;
        }
        Ok(())
    }

    pub fn decode_bit(&mut self, prob: &mut BitModel) -> Result<u32> {
        self.normalize()?;
        let bound = (self.range >> BIT_MODEL_TOTAL_BITS) * prob.0 as u32;
        if self.code < bound {
            self.range = bound;
            prob.update_0();
            Ok(0)
        } else {
            self.code -= bound;
            self.range -= bound;
            prob.update_1();
            Ok(1)
        }
    }

    /// Decodes `count` bits without a model, high bit first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            self.normalize()?;
            self.range >>= 1;
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code -= self.range & t.wrapping_sub(1);
            result = (result << 1) | (1 - t);
        }
        Ok(result)
    }

    /// The code register returns to zero exactly when the decoder consumed
    /// a well-formed coded stream to its end.
    pub fn is_finished(&self) -> bool {
        self.code == 0
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
    fn test_direct_bits_round_trip() {
        let mut buf = Vec::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for i in 0..100 {
            encoder.encode_direct_bits(i, 8).unwrap();
        }
        encoder.flush().unwrap();
        assert_eq!(buf.len(), 105);

        let mut decoder = decoder_for(buf);
        for i in 0..100 {
            assert_eq!(decoder.decode_direct_bits(8).unwrap(), i);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_modeled_bits_round_trip() {
        let mut buf = Vec::new();
        let mut prob = BitModel::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for i in 0..100u32 {
            for bit in 0..32 {
                encoder.encode_bit(&mut prob, (i >> bit) & 1).unwrap();
            }
        }
        encoder.flush().unwrap();

        let mut prob = BitModel::new();
        let mut decoder = decoder_for(buf);
        for i in 0..100u32 {
            let mut result = 0;
            for bit in 0..32 {
                result |= decoder.decode_bit(&mut prob).unwrap() << bit;
            }
            assert_eq!(result, i);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_skewed_stream_compresses() {
        let mut buf = Vec::new();
        let mut prob = BitModel::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        for _ in 0..1000 {
            encoder.encode_bit(&mut prob, 0).unwrap();
        }
        encoder.encode_bit(&mut prob, 1).unwrap();
        for _ in 0..1000 {
            encoder.encode_bit(&mut prob, 0).unwrap();
        }
        encoder.flush().unwrap();
        assert!(buf.len() < 20);

        let mut prob = BitModel::new();
        let mut decoder = decoder_for(buf);
        for _ in 0..1000 {
            assert_eq!(decoder.decode_bit(&mut prob).unwrap(), 0);
        }
        assert_eq!(decoder.decode_bit(&mut prob).unwrap(), 1);
        for _ in 0..1000 {
            assert_eq!(decoder.decode_bit(&mut prob).unwrap(), 0);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_member_accounting() {
        let mut buf = Vec::new();
        let mut encoder = RangeEncoder::new(&mut buf);
        encoder.write_raw(b"ABCDEF").unwrap();
        encoder.encode_direct_bits(0x5A, 8).unwrap();
        encoder.flush().unwrap();
        let written = encoder.member_position();
        drop(encoder);
        assert_eq!(written, buf.len() as u64);

        let mut decoder = RangeDecoder::new(Cursor::new(buf));
        let mut header = [0u8; 6];
        assert_eq!(decoder.read_data(&mut header).unwrap(), 6);
        assert_eq!(&header, b"ABCDEF");
        decoder.reset_member_position();
        assert_eq!(decoder.member_position(), 0);
        decoder.load(true).unwrap();
        assert_eq!(decoder.decode_direct_bits(8).unwrap(), 0x5A);
    }

    #[test]
    fn test_marking_byte_policy() {
        let data = vec![1u8, 0, 0, 0, 0, 0, 0, 0];
        let mut decoder = RangeDecoder::new(Cursor::new(data.clone()));
        assert!(matches!(decoder.load(false), Err(Error::MarkedMember)));

        let mut decoder = RangeDecoder::new(Cursor::new(data));
        assert!(decoder.load(true).is_ok());
    }
}
