//! # rlzip
//!
//! A lossless data compressor and decompressor for the lzip format: an
//! LZMA stream wrapped in a 6-byte header and a 20-byte trailer carrying
//! a CRC-32 and both sizes. Files are non-empty concatenations of such
//! members, optionally followed by trailing data.
//!
//! The crate exposes the codec as a library; the `rlzip` binary wires it
//! to a gzip-style command line.
//!
//! ## Example
//!
//! ```rust
//! let data = b"The quick brown fox jumps over the lazy dog.\n";
//! let compressed = rlzip::compress_to_vec(data, 6).unwrap();
//! let restored =
//!     rlzip::decompress_to_vec(&compressed, &rlzip::DecodeOptions::default()).unwrap();
//! assert_eq!(&restored, data);
//! ```

pub mod checksum;
pub mod codecs;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod index;
pub mod options;

pub use error::{Error, Result};
pub use index::FileIndex;
pub use options::{DecodeOptions, EncoderOptions};

use std::io::{Read, Write};

use codecs::range_codec::RangeDecoder;
use decoder::LzDecoder;
use encoder::Encoder;
use header::{check_corrupt, check_prefix, Header, HEADER_SIZE};

/// Default member size limit: 2 PiB.
pub const DEFAULT_MEMBER_SIZE: u64 = 0x0008_0000_0000_0000;
/// Upper bound for the volume size option: 4 EiB.
pub const MAX_VOLUME_SIZE: u64 = 0x4000_0000_0000_0000;

/// Compresses `reader` into `writer` as one or more members, each at
/// most `member_size` bytes. Returns (uncompressed, compressed) totals.
pub fn compress<R: Read, W: Write>(
    reader: R,
    writer: W,
    options: &EncoderOptions,
    fast: bool,
    member_size: u64,
) -> Result<(u64, u64)> {
    if member_size < 1000 {
        return Err(Error::InvalidOptions(format!(
            "member size {} too small",
            member_size
        )));
    }
    let mut encoder = if fast {
        Encoder::new_fast(reader, writer, *options)?
    } else {
        Encoder::new_normal(reader, writer, *options)?
    };
    let mut in_total = 0u64;
    let mut out_total = 0u64;
    loop {
        let finished = encoder.encode_member(member_size)?;
        in_total += encoder.data_position();
        out_total += encoder.member_position();
        if finished {
            return Ok((in_total, out_total));
        }
        encoder.reset();
    }
}

/// Hex-and-printable rendering of trailing bytes for diagnostics.
fn render_trailing(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    for byte in data {
        let _ = write!(out, "{:02X} ", byte);
    }
    out.push('\'');
    for &byte in data {
        out.push(if byte.is_ascii_graphic() || byte == b' ' {
            byte as char
        } else {
            '.'
        });
    }
    out.push('\'');
    out
}

/// Reborrows `w` with a fresh lifetime tied to this call, so it can be
/// passed into a new `LzDecoder` on each loop iteration without the
/// borrow checker treating it as live for the whole caller's scope.
fn reborrow_writer<'a>(w: &'a mut Option<&mut dyn Write>) -> Option<&'a mut dyn Write> {
    match w {
        Some(w) => Some(&mut **w),
        None => None,
    }
}

/// Decompresses every member of `reader` into `writer` (or nowhere, for
/// testing). Returns the number of decoded bytes.
pub fn decompress<R: Read>(
    reader: R,
    mut writer: Option<&mut dyn Write>,
    options: &DecodeOptions,
) -> Result<u64> {
    let mut rdec = RangeDecoder::new(reader);
    let mut partial_file_pos = 0u64;
    let mut total = 0u64;
    let mut first_member = true;
    loop {
        rdec.reset_member_position();
        let mut hbuf = [0u8; HEADER_SIZE];
        let size = rdec.read_data(&mut hbuf)?;
        if rdec.finished()? {
            // End of file while looking for the next header.
            if first_member {
                return Err(Error::UnexpectedEof {
                    pos: partial_file_pos + size as u64,
                });
            }
            if check_prefix(&hbuf[..size]) {
                return Err(Error::TruncatedHeader);
            }
            if size > 0 {
                log::debug!("trailing data = {}", render_trailing(&hbuf[..size]));
                if !options.ignore_trailing {
                    return Err(Error::TrailingData);
                }
            }
            break;
        }
        let header = match Header::decode(&hbuf) {
            Ok(header) => header,
            Err(Error::BadMagic) if !first_member => {
                if !options.loose_trailing && check_corrupt(&hbuf) {
                    return Err(Error::CorruptHeader);
                }
                if !options.ignore_trailing {
                    return Err(Error::TrailingData);
                }
                log::debug!("first bytes of trailing data = {}", render_trailing(&hbuf));
                break;
            }
            Err(e) => return Err(e),
        };

        let mut decoder = LzDecoder::new(header.dictionary_size(), reborrow_writer(&mut writer));
        match decoder.decode_member(&mut rdec, options) {
            Ok(()) => {}
            Err(Error::UnexpectedEof { pos }) => {
                return Err(Error::UnexpectedEof {
                    pos: partial_file_pos + pos,
                })
            }
            Err(Error::DecoderError { pos }) => {
                return Err(Error::DecoderError {
                    pos: partial_file_pos + pos,
                })
            }
            Err(e) => return Err(e),
        }
        total += decoder.data_position();
        partial_file_pos += rdec.member_position();
        first_member = false;
    }
    Ok(total)
}

/// One-shot compression of a byte slice at a gzip-style level 0..9.
pub fn compress_to_vec(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let options = EncoderOptions::from_level(level)?;
    let mut out = Vec::new();
    compress(data, &mut out, &options, level == 0, DEFAULT_MEMBER_SIZE)?;
    Ok(out)
}

/// One-shot decompression of a byte slice.
pub fn decompress_to_vec(data: &[u8], options: &DecodeOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decompress(data, Some(&mut out as &mut dyn Write), options)?;
    Ok(out)
}
