//! LZ encoding: member framing plus the two instruction pickers.
//!
//! A `MemberEncoder` pulls input through a sliding window, lets its
//! picker choose literal/match/rep instructions, emits them through the
//! range coder, and closes each member with the End-Of-Stream marker and
//! the trailer. The fast and normal variants share everything but the
//! picker and the match finder; [`Encoder`] is the variant type drivers
//! work with.

pub mod buffer;
pub mod cyclic;
mod fast;
pub mod match_finder;
mod normal;

pub use fast::FastPicker;
pub use normal::NormalPicker;

use std::io::{ErrorKind, Read, Write};

use crate::checksum::Crc32;
use crate::codecs::lzma::LzmaEncoder;
use crate::codecs::range_codec::RangeEncoder;
use crate::codecs::POS_STATE_MASK;
use crate::error::{Error, Result};
use crate::header::{Header, Trailer, MIN_DICT_SIZE, TRAILER_SIZE};
use crate::options::EncoderOptions;

use self::buffer::{WindowBuffer, LOOKAHEAD_SIZE};
use self::match_finder::{Bt4MatchFinder, Hc4MatchFinder, Match, MatchFinder};

/// One encoding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeInstruction {
    Literal,
    Rep { index: usize, len: u32 },
    Match(Match),
}

impl EncodeInstruction {
    pub fn length(&self) -> u32 {
        match *self {
            EncodeInstruction::Literal => 1,
            EncodeInstruction::Rep { len, .. } => len,
            EncodeInstruction::Match(m) => m.len,
        }
    }
}

/// Chooses the next instruction. Pickers may read ahead through the
/// input; the member encoder re-synchronises afterwards.
pub trait InstructionPicker<F: MatchFinder> {
    fn pick(&mut self, input: &mut EncoderInput<F>, model: &mut LzmaEncoder) -> EncodeInstruction;

    /// Drops any cross-call state (new member).
    fn reset(&mut self);
}

/// The sliding window plus the match finder that indexes it.
///
/// Protocol: every position is handed to the finder exactly once, either
/// through [`matches`] or [`skip_current`], before the head moves past it.
///
/// [`matches`]: EncoderInput::matches
/// [`skip_current`]: EncoderInput::skip_current
pub struct EncoderInput<F: MatchFinder> {
    buffer: WindowBuffer,
    finder: F,
    matches: Vec<Match>,
    processed: bool,
}

impl<F: MatchFinder> EncoderInput<F> {
    fn new(buffer: WindowBuffer, finder: F) -> Self {
        Self {
            buffer,
            finder,
            matches: Vec::new(),
            processed: false,
        }
    }

    pub fn pos(&self) -> u64 {
        self.buffer.pos()
    }

    pub fn total_bytes(&self) -> u64 {
        self.buffer.total()
    }

    pub fn forward_bytes(&self) -> usize {
        self.buffer.forward_bytes()
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    /// Candidate matches for the head position, longest last. Cached
    /// until the head advances.
    pub fn matches(&mut self) -> &[Match] {
        if !self.processed {
            let mut matches = std::mem::take(&mut self.matches);
            self.finder.matches(&self.buffer, &mut matches);
            self.matches = matches;
            self.processed = true;
        }
        &self.matches
    }

    /// Indexes the head position without searching.
    pub fn skip_current(&mut self) {
        if !self.processed {
            self.finder.skip(&self.buffer);
            self.processed = true;
        }
    }

    /// Moves the head one byte forward. The position being left must
    /// already be processed.
    pub fn advance(&mut self) {
        debug_assert!(self.processed);
        self.buffer.increment_pos();
        self.processed = false;
    }

    /// Moves the head to `target`, indexing every skipped position.
    fn advance_to(&mut self, target: u64) {
        while self.buffer.pos() < target {
            self.skip_current();
            self.advance();
        }
    }

    fn reset(&mut self) {
        self.buffer.reset();
        self.finder.reset();
        self.matches.clear();
        self.processed = false;
    }
}

/// Room left below the member-size limit for the worst-case final symbol,
/// the EOS marker, the coder flush, and the trailer.
const MEMBER_CLOSE_MARGIN: u64 = 64;

pub struct MemberEncoder<R: Read, W: Write, F: MatchFinder, P: InstructionPicker<F>> {
    reader: R,
    rc: RangeEncoder<W>,
    input: EncoderInput<F>,
    picker: P,
    model: LzmaEncoder,
    crc: Crc32,
    data_position: u64,
    header: Header,
    dict_size: u32,
    match_len_limit: u32,
    prefill: Vec<u8>,
    prefill_pos: usize,
    read_eof: bool,
    member_started: bool,
}

impl<R: Read, W: Write, F: MatchFinder, P: InstructionPicker<F>> MemberEncoder<R, W, F, P> {
    fn with_parts(
        mut reader: R,
        writer: W,
        options: EncoderOptions,
        make_finder: impl FnOnce(u32, u32) -> F,
        picker: P,
    ) -> Result<Self> {
        // Prefetch up to a dictionary's worth of input: a short first
        // input shrinks the coded dictionary accordingly.
        let requested = options.dictionary_size;
        let mut prefill = Vec::new();
        let mut read_eof = false;
        let mut chunk = [0u8; 65536];
        while prefill.len() < requested as usize {
            let want = chunk.len().min(requested as usize - prefill.len());
            match reader.read(&mut chunk[..want]) {
                Ok(0) => {
                    read_eof = true;
                    break;
                }
                Ok(n) => prefill.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        let coded_size = if read_eof {
            (prefill.len() as u32).max(MIN_DICT_SIZE)
        } else {
            requested
        };
        let header = Header::from_dict_size(coded_size)?;
        let dict_size = header.dictionary_size();

        Ok(Self {
            reader,
            rc: RangeEncoder::new(writer),
            input: EncoderInput::new(
                WindowBuffer::new(dict_size, LOOKAHEAD_SIZE),
                make_finder(dict_size, options.match_len_limit),
            ),
            picker,
            model: LzmaEncoder::new(dict_size, options.match_len_limit),
            crc: Crc32::new(),
            data_position: 0,
            header,
            dict_size,
            match_len_limit: options.match_len_limit,
            prefill,
            prefill_pos: 0,
            read_eof,
            member_started: false,
        })
    }

    /// Uncompressed bytes encoded into the current member.
    pub fn data_position(&self) -> u64 {
        self.data_position
    }

    /// Compressed bytes emitted for the current member so far.
    pub fn member_position(&self) -> u64 {
        self.rc.member_position()
    }

    fn fill_input(&mut self) -> Result<()> {
        loop {
            let available = self.input.buffer.available_append();
            if available == 0 {
                return Ok(());
            }
            if self.prefill_pos < self.prefill.len() {
                let n = available.min(self.prefill.len() - self.prefill_pos);
                let chunk = &self.prefill[self.prefill_pos..self.prefill_pos + n];
                self.input.buffer.append(chunk);
                self.prefill_pos += n;
                continue;
            }
            if self.read_eof {
                return Ok(());
            }
            let mut chunk = [0u8; 16384];
            let want = available.min(chunk.len());
            match self.reader.read(&mut chunk[..want]) {
                Ok(0) => {
                    self.read_eof = true;
                    return Ok(());
                }
                Ok(n) => self.input.buffer.append(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn all_data_encoded(&self) -> bool {
        self.read_eof
            && self.prefill_pos >= self.prefill.len()
            && self.data_position == self.input.total_bytes()
    }

    fn close_member(&mut self) -> Result<()> {
        let pos_state = (self.data_position & POS_STATE_MASK as u64) as usize;
        self.model.encode_eos(&mut self.rc, pos_state)?;
        self.rc.flush()?;
        let trailer = Trailer {
            data_crc: self.crc.value(),
            data_size: self.data_position,
            member_size: self.rc.member_position() + TRAILER_SIZE as u64,
        };
        self.rc.write_raw(&trailer.encode())?;
        Ok(())
    }

    /// Encodes one member of at most `member_size_limit` bytes. Returns
    /// true when the input is exhausted (this was the last member).
    pub fn encode_member(&mut self, member_size_limit: u64) -> Result<bool> {
        if !self.member_started {
            self.rc.write_raw(&self.header.encode())?;
            self.member_started = true;
        }
        loop {
            self.fill_input()?;
            if self.all_data_encoded() {
                self.close_member()?;
                return Ok(true);
            }
            if self.rc.member_position() + MEMBER_CLOSE_MARGIN > member_size_limit {
                self.close_member()?;
                return Ok(false);
            }

            let pos_state = (self.data_position & POS_STATE_MASK as u64) as usize;
            let instruction = self.picker.pick(&mut self.input, &mut self.model);
            let len = instruction.length();

            // The instruction's bytes relative to the (possibly
            // read-ahead) head.
            let base = self.data_position as i64 - self.input.pos() as i64;
            for i in 0..len as i64 {
                self.crc.update_byte(self.input.buffer.get_byte((base + i) as i32));
            }

            match instruction {
                EncodeInstruction::Literal => {
                    let cur = self.input.buffer.get_byte(base as i32);
                    let prev = self.input.buffer.get_byte(base as i32 - 1);
                    let match_byte = self
                        .input
                        .buffer
                        .get_byte((base - self.model.reps[0] as i64 - 1) as i32);
                    self.model
                        .encode_literal(&mut self.rc, pos_state, cur, prev, match_byte)?;
                }
                EncodeInstruction::Rep { index, len } => {
                    self.model.encode_rep(&mut self.rc, pos_state, index, len)?;
                }
                EncodeInstruction::Match(m) => {
                    self.model
                        .encode_match(&mut self.rc, pos_state, m.distance, m.len)?;
                }
            }

            self.data_position += len as u64;
            self.input.advance_to(self.data_position);
        }
    }

    /// Prepares the next member: models, window and finder start fresh,
    /// bytes read ahead but not yet encoded carry over.
    pub fn reset(&mut self) {
        let head = self.input.pos();
        let total = self.input.total_bytes();
        let mut carry = Vec::with_capacity((total - self.data_position) as usize);
        for abs in self.data_position..total {
            carry.push(self.input.buffer.get_byte((abs as i64 - head as i64) as i32));
        }
        carry.extend_from_slice(&self.prefill[self.prefill_pos..]);
        self.prefill = carry;
        self.prefill_pos = 0;

        self.input.reset();
        self.picker.reset();
        self.model = LzmaEncoder::new(self.dict_size, self.match_len_limit);
        self.crc.reset();
        self.data_position = 0;
        self.rc.reset_member();
        self.member_started = false;
    }

    /// Swaps the output stream at a member boundary (volume files).
    pub fn replace_writer(&mut self, writer: W) -> W {
        std::mem::replace(self.rc.inner(), writer)
    }
}

/// The two encoder flavours behind one operation set.
pub enum Encoder<R: Read, W: Write> {
    /// Greedy lazy matching over a hash-chain finder (level 0).
    Fast(MemberEncoder<R, W, Hc4MatchFinder, FastPicker>),
    /// Price-based optimal parsing over a binary-tree finder.
    Normal(MemberEncoder<R, W, Bt4MatchFinder, NormalPicker>),
}

impl<R: Read, W: Write> Encoder<R, W> {
    pub fn new_fast(reader: R, writer: W, options: EncoderOptions) -> Result<Self> {
        options.validate()?;
        let picker = FastPicker::new(options.match_len_limit);
        Ok(Encoder::Fast(MemberEncoder::with_parts(
            reader,
            writer,
            options,
            Hc4MatchFinder::new,
            picker,
        )?))
    }

    pub fn new_normal(reader: R, writer: W, options: EncoderOptions) -> Result<Self> {
        options.validate()?;
        let picker = NormalPicker::new(options.match_len_limit);
        Ok(Encoder::Normal(MemberEncoder::with_parts(
            reader,
            writer,
            options,
            Bt4MatchFinder::new,
            picker,
        )?))
    }

    pub fn encode_member(&mut self, member_size_limit: u64) -> Result<bool> {
        match self {
            Encoder::Fast(e) => e.encode_member(member_size_limit),
            Encoder::Normal(e) => e.encode_member(member_size_limit),
        }
    }

    pub fn data_position(&self) -> u64 {
        match self {
            Encoder::Fast(e) => e.data_position(),
            Encoder::Normal(e) => e.data_position(),
        }
    }

    pub fn member_position(&self) -> u64 {
        match self {
            Encoder::Fast(e) => e.member_position(),
            Encoder::Normal(e) => e.member_position(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Encoder::Fast(e) => e.reset(),
            Encoder::Normal(e) => e.reset(),
        }
    }

    pub fn replace_writer(&mut self, writer: W) -> W {
        match self {
            Encoder::Fast(e) => e.replace_writer(writer),
            Encoder::Normal(e) => e.replace_writer(writer),
        }
    }
}
