//! LZ decoding into a circular dictionary.
//!
//! One `LzDecoder` decodes exactly one member: it owns the dictionary
//! buffer and the probability models, pulls symbols from the range
//! decoder, and verifies the trailer when the End-Of-Stream marker
//! arrives. Decoded bytes are flushed to the output (if any) and run
//! through the CRC as the write head advances.

use std::io::{Read, Write};

use crate::checksum::Crc32;
use crate::codecs::lzma::{LzmaDecoder, MARKER_DISTANCE};
use crate::codecs::range_codec::RangeDecoder;
use crate::codecs::{MATCH_LEN_MIN, POS_STATE_MASK};
use crate::error::{Error, Result};
use crate::header::{Trailer, TRAILER_SIZE};
use crate::options::DecodeOptions;

pub struct LzDecoder<'a> {
    lzma: LzmaDecoder,
    buffer: Box<[u8]>,
    dict_size: usize,
    /// Write head inside the dictionary.
    pos: usize,
    /// Everything below this has been flushed to the output.
    stream_pos: usize,
    partial_data_pos: u64,
    pos_wrapped: bool,
    crc: Crc32,
    out: Option<&'a mut dyn Write>,
}

impl<'a> LzDecoder<'a> {
    pub fn new(dict_size: u32, out: Option<&'a mut dyn Write>) -> Self {
        Self {
            lzma: LzmaDecoder::new(),
            // Zeroed so the byte "before" position zero reads as zero.
            buffer: vec![0u8; dict_size as usize].into_boxed_slice(),
            dict_size: dict_size as usize,
            pos: 0,
            stream_pos: 0,
            partial_data_pos: 0,
            pos_wrapped: false,
            crc: Crc32::new(),
            out,
        }
    }

    pub fn data_position(&self) -> u64 {
        self.partial_data_pos + self.pos as u64
    }

    fn peek_prev(&self) -> u8 {
        if self.pos > 0 {
            self.buffer[self.pos - 1]
        } else {
            self.buffer[self.dict_size - 1]
        }
    }

    fn peek(&self, distance: u32) -> u8 {
        let distance = distance as usize;
        if self.pos > distance {
            self.buffer[self.pos - distance - 1]
        } else if self.pos_wrapped {
            self.buffer[self.dict_size + self.pos - distance - 1]
        } else {
            0
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<()> {
        self.buffer[self.pos] = byte;
        self.pos += 1;
        if self.pos >= self.dict_size {
            self.flush_data()?;
        }
        Ok(())
    }

    fn copy_block(&mut self, distance: u32, len: u32) -> Result<()> {
        let mut i = if self.pos > distance as usize {
            self.pos - distance as usize - 1
        } else {
            self.dict_size + self.pos - distance as usize - 1
        };
        for _ in 0..len {
            let byte = self.buffer[i];
            i += 1;
            if i >= self.dict_size {
                i = 0;
            }
            self.put_byte(byte)?;
        }
        Ok(())
    }

    /// Checksums and writes everything between the flush mark and the
    /// write head, wrapping the head when it reaches the end.
    fn flush_data(&mut self) -> Result<()> {
        if self.pos > self.stream_pos {
            let chunk = &self.buffer[self.stream_pos..self.pos];
            self.crc.update(chunk);
            if let Some(out) = self.out.as_deref_mut() {
                out.write_all(chunk)?;
            }
            if self.pos >= self.dict_size {
                self.partial_data_pos += self.pos as u64;
                self.pos = 0;
                self.pos_wrapped = true;
            }
            self.stream_pos = self.pos;
        }
        Ok(())
    }

    fn check_trailer<R: Read>(
        &mut self,
        rdec: &mut RangeDecoder<R>,
        options: &DecodeOptions,
    ) -> Result<()> {
        let mut tbuf = [0u8; TRAILER_SIZE];
        let size = rdec.read_data(&mut tbuf)?;
        let truncated = size < TRAILER_SIZE;
        if truncated {
            log::debug!("trailer truncated at trailer position {}", size);
        }
        let trailer = Trailer::decode(&tbuf);

        let crc_computed = self.crc.value();
        let data_size_computed = self.data_position();
        let member_size_computed = rdec.member_position();
        if truncated
            || trailer.data_crc != crc_computed
            || trailer.data_size != data_size_computed
            || trailer.member_size != member_size_computed
        {
            return Err(Error::TrailerMismatch {
                crc_stored: trailer.data_crc,
                crc_computed,
                data_size_stored: trailer.data_size,
                data_size_computed,
                member_size_stored: trailer.member_size,
                member_size_computed,
            });
        }
        if data_size_computed == 0 && !options.ignore_empty {
            return Err(Error::EmptyMember);
        }
        Ok(())
    }

    /// Decodes the member payload following an already-read header, up to
    /// and including the trailer.
    pub fn decode_member<R: Read>(
        &mut self,
        rdec: &mut RangeDecoder<R>,
        options: &DecodeOptions,
    ) -> Result<()> {
        rdec.load(options.ignore_marking)?;
        while !rdec.finished()? {
            let pos_state = (self.data_position() & POS_STATE_MASK as u64) as usize;
            let state = self.lzma.state.get();
            if rdec.decode_bit(&mut self.lzma.is_match[state][pos_state])? == 0 {
                // Literal.
                let prev = self.peek_prev();
                let byte = if self.lzma.state.is_literal() {
                    self.lzma.literals.decode_normal(rdec, prev)?
                } else {
                    let match_byte = self.peek(self.lzma.reps[0]);
                    self.lzma.literals.decode_matched(rdec, prev, match_byte)?
                };
                self.lzma.state.update_literal();
                self.put_byte(byte)?;
                continue;
            }

            let len;
            if rdec.decode_bit(&mut self.lzma.is_rep[state])? != 0 {
                // Repeated match.
                if rdec.decode_bit(&mut self.lzma.is_rep0[state])? == 0 {
                    if rdec.decode_bit(&mut self.lzma.is_rep0_long[state][pos_state])? == 0 {
                        self.lzma.state.update_short_rep();
                        let byte = self.peek(self.lzma.reps[0]);
                        self.put_byte(byte)?;
                        continue;
                    }
                } else {
                    let distance;
                    if rdec.decode_bit(&mut self.lzma.is_rep1[state])? == 0 {
                        distance = self.lzma.reps[1];
                    } else {
                        if rdec.decode_bit(&mut self.lzma.is_rep2[state])? == 0 {
                            distance = self.lzma.reps[2];
                        } else {
                            distance = self.lzma.reps[3];
                            self.lzma.reps[3] = self.lzma.reps[2];
                        }
                        self.lzma.reps[2] = self.lzma.reps[1];
                    }
                    self.lzma.reps[1] = self.lzma.reps[0];
                    self.lzma.reps[0] = distance;
                }
                self.lzma.state.update_rep();
                len = self.lzma.rep_len.decode(rdec, pos_state)?;
            } else {
                // Fresh match.
                len = self.lzma.match_len.decode(rdec, pos_state)?;
                let distance = self.lzma.decode_distance(rdec, len)?;
                if distance == MARKER_DISTANCE {
                    rdec.normalize()?;
                    self.flush_data()?;
                    if len == MATCH_LEN_MIN as u32 {
                        // End Of Stream.
                        return self.check_trailer(rdec, options);
                    }
                    if len == MATCH_LEN_MIN as u32 + 1 {
                        // Sync flush: the coder restarts on the next byte.
                        rdec.load(true)?;
                        continue;
                    }
                    return Err(Error::UnknownMarker { len });
                }
                self.lzma.reps[3] = self.lzma.reps[2];
                self.lzma.reps[2] = self.lzma.reps[1];
                self.lzma.reps[1] = self.lzma.reps[0];
                self.lzma.reps[0] = distance;
                self.lzma.state.update_match();
                if self.lzma.reps[0] as usize >= self.dict_size
                    || (self.lzma.reps[0] as usize >= self.pos && !self.pos_wrapped)
                {
                    self.flush_data()?;
                    return Err(Error::DecoderError {
                        pos: rdec.member_position(),
                    });
                }
            }
            self.copy_block(self.lzma.reps[0], len)?;
        }
        self.flush_data()?;
        Err(Error::UnexpectedEof {
            pos: rdec.member_position(),
        })
    }
}
