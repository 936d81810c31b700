//! Error types for lzip streams.
//!
//! All fallible operations in this crate return [`Result<T>`]. The variants
//! split along the boundaries that matter to a driver: environmental
//! problems (I/O, bad options) versus corrupt or invalid input data, which
//! is the distinction the exit-status contract is built on.

use std::io;

/// The error type for every operation on lzip streams.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error on the input or output stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The first four bytes of a member are not the lzip magic.
    #[error("Bad magic number (file not in lzip format).")]
    BadMagic,

    /// The member format version is not supported.
    #[error("Version {version} member format not supported.")]
    UnsupportedVersion { version: u8 },

    /// The coded dictionary size is outside [4 KiB, 512 MiB].
    #[error("Invalid dictionary size in member header.")]
    BadDictSize,

    /// A non-first member header matches the magic in 2 or 3 of 4 bytes.
    #[error("Corrupt header in multimember file.")]
    CorruptHeader,

    /// The file ends with a prefix of the magic bytes.
    #[error("Truncated header in multimember file.")]
    TruncatedHeader,

    /// Trailing data found and the trailing policy forbids it.
    #[error("Trailing data not allowed.")]
    TrailingData,

    /// A decoded match distance points outside the dictionary.
    #[error("Decoder error at pos {pos}")]
    DecoderError { pos: u64 },

    /// The input ended in the middle of a member.
    #[error("File ends unexpectedly at pos {pos}")]
    UnexpectedEof { pos: u64 },

    /// The member trailer does not match the decoded data.
    #[error("Trailer mismatch: stored CRC {crc_stored:08X}, computed {crc_computed:08X}; \
             stored data size {data_size_stored}, computed {data_size_computed}; \
             stored member size {member_size_stored}, computed {member_size_computed}")]
    TrailerMismatch {
        crc_stored: u32,
        crc_computed: u32,
        data_size_stored: u64,
        data_size_computed: u64,
        member_size_stored: u64,
        member_size_computed: u64,
    },

    /// A marker distance was decoded with a length other than 2 or 3.
    #[error("Unsupported marker code '{len}'")]
    UnknownMarker { len: u32 },

    /// An empty member was found and the empty policy forbids it.
    #[error("Empty member not allowed.")]
    EmptyMember,

    /// The marking byte at member start is nonzero and the policy forbids it.
    #[error("Marking data not allowed.")]
    MarkedMember,

    /// The index scan found an inconsistent trailer mid-file.
    #[error("Bad trailer at pos {pos}")]
    BadTrailer { pos: u64 },

    /// The index scan found an invalid header mid-file.
    #[error("Bad header at pos {pos}")]
    BadHeader { pos: u64 },

    /// The last member is truncated or its tail resembles a header.
    #[error("Last member in input file is truncated or corrupt.")]
    TruncatedMember,

    /// The input is shorter than the minimum member size.
    #[error("Input file is too short.")]
    TooShort,

    /// The input is 2^63 bytes or longer.
    #[error("Input file is too long (2^63 bytes or more).")]
    TooLong,

    /// The decompressed size would exceed 2^63 - 1 bytes.
    #[error("Data in input file is too long (2^63 bytes or more).")]
    DataTooLong,

    /// No member index could be built from the input.
    #[error("Can't create file index.")]
    BadIndex,

    /// The input stream does not support seeking.
    #[error("Input file is not seekable.")]
    NotSeekable,

    /// Invalid or contradictory configuration.
    #[error("{0}")]
    InvalidOptions(String),
}

impl Error {
    /// Exit status this error maps to: 1 for environmental problems,
    /// 2 for corrupt or invalid input.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) | Error::NotSeekable | Error::InvalidOptions(_) => 1,
            _ => 2,
        }
    }

    /// True for errors that indicate damaged data rather than a file that
    /// was never in lzip format.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::DecoderError { .. }
                | Error::UnexpectedEof { .. }
                | Error::TrailerMismatch { .. }
                | Error::UnknownMarker { .. }
                | Error::BadTrailer { .. }
                | Error::BadHeader { .. }
                | Error::TruncatedMember
                | Error::TruncatedHeader
                | Error::CorruptHeader
        )
    }
}

/// A specialized Result type for lzip operations.
pub type Result<T> = std::result::Result<T, Error>;
