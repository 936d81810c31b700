//! Compression parameters and decoding policies.

use crate::codecs::{MATCH_LEN_MAX, MIN_MATCH_LEN_LIMIT};
use crate::error::{Error, Result};
use crate::header::{MAX_DICT_SIZE, MIN_DICT_SIZE};

/// LZMA parameters selected by a gzip-style compression level.
///
/// Level 0 selects the fast (greedy) encoder; levels 1..9 select the
/// optimal-parsing encoder with growing dictionaries and match lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Sliding window size in bytes, 4 KiB .. 512 MiB.
    pub dictionary_size: u32,
    /// Upper limit for match lengths, 5 .. 273.
    pub match_len_limit: u32,
}

/// Mapping from compression levels 0..9 to LZMA parameters.
const OPTION_MAPPING: [EncoderOptions; 10] = [
    EncoderOptions { dictionary_size: 1 << 16, match_len_limit: 16 },  // -0
    EncoderOptions { dictionary_size: 1 << 20, match_len_limit: 5 },   // -1
    EncoderOptions { dictionary_size: 3 << 19, match_len_limit: 6 },   // -2
    EncoderOptions { dictionary_size: 1 << 21, match_len_limit: 8 },   // -3
    EncoderOptions { dictionary_size: 3 << 20, match_len_limit: 12 },  // -4
    EncoderOptions { dictionary_size: 1 << 22, match_len_limit: 20 },  // -5
    EncoderOptions { dictionary_size: 1 << 23, match_len_limit: 36 },  // -6
    EncoderOptions { dictionary_size: 1 << 24, match_len_limit: 68 },  // -7
    EncoderOptions { dictionary_size: 3 << 23, match_len_limit: 132 }, // -8
    EncoderOptions { dictionary_size: 1 << 25, match_len_limit: 273 }, // -9
];

impl EncoderOptions {
    /// Parameters for compression level 0..9. The default level is 6.
    pub fn from_level(level: u32) -> Result<Self> {
        OPTION_MAPPING
            .get(level as usize)
            .copied()
            .ok_or_else(|| Error::InvalidOptions(format!("invalid compression level {}", level)))
    }

    /// Checks both parameters against their legal ranges.
    pub fn validate(&self) -> Result<()> {
        if self.dictionary_size < MIN_DICT_SIZE || self.dictionary_size > MAX_DICT_SIZE {
            return Err(Error::InvalidOptions(format!(
                "dictionary size {} out of range [{}, {}]",
                self.dictionary_size, MIN_DICT_SIZE, MAX_DICT_SIZE
            )));
        }
        if self.match_len_limit < MIN_MATCH_LEN_LIMIT || self.match_len_limit > MATCH_LEN_MAX as u32
        {
            return Err(Error::InvalidOptions(format!(
                "match length limit {} out of range [{}, {}]",
                self.match_len_limit, MIN_MATCH_LEN_LIMIT, MATCH_LEN_MAX
            )));
        }
        Ok(())
    }
}

impl Default for EncoderOptions {
    fn default() -> Self {
        OPTION_MAPPING[6]
    }
}

/// Tolerance policies applied while decoding, testing, and listing.
///
/// The defaults match the tool's defaults: empty members, nonzero marking
/// bytes, and trailing data are tolerated; trailing bytes that resemble a
/// corrupt header are not.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub ignore_empty: bool,
    pub ignore_marking: bool,
    pub ignore_trailing: bool,
    pub loose_trailing: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            ignore_empty: true,
            ignore_marking: true,
            ignore_trailing: true,
            loose_trailing: false,
        }
    }
}
