//! Member header and trailer codecs.
//!
//! A member starts with a 6-byte header (magic "LZIP", version, coded
//! dictionary size) and ends with a 20-byte little-endian trailer (CRC-32,
//! uncompressed size, member size). The dictionary size is coded as a
//! power of two minus a fraction of 0..7 sixteenths of it, which covers
//! every size in the legal range with at most 1/16 overshoot.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

pub const MAGIC: [u8; 4] = [0x4C, 0x5A, 0x49, 0x50]; // "LZIP"
pub const VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 6;
pub const TRAILER_SIZE: usize = 20;
/// Smallest possible member: header + empty LZMA stream + trailer.
pub const MIN_MEMBER_SIZE: u64 = 36;

pub const MIN_DICT_BITS: u32 = 12;
pub const MAX_DICT_BITS: u32 = 29;
pub const MIN_DICT_SIZE: u32 = 1 << MIN_DICT_BITS; // 4 KiB
pub const MAX_DICT_SIZE: u32 = 1 << MAX_DICT_BITS; // 512 MiB

pub fn valid_dict_size(size: u32) -> bool {
    (MIN_DICT_SIZE..=MAX_DICT_SIZE).contains(&size)
}

/// True if the first `min(len, 4)` bytes of `data` match the magic.
/// Detects a truncated header at end of file.
pub fn check_prefix(data: &[u8]) -> bool {
    let n = data.len().min(4);
    n > 0 && data[..n] == MAGIC[..n]
}

/// True if 2 or 3 of the 4 magic bytes match: the single-damaged-byte
/// heuristic for a corrupt header in a multimember file.
pub fn check_corrupt(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    let matches = data[..4].iter().zip(MAGIC.iter()).filter(|(a, b)| a == b).count();
    (2..=3).contains(&matches)
}

/// A decoded (or to-be-encoded) member header. Only the coded dictionary
/// size byte carries information beyond the fixed magic and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    coded_dict: u8,
}

impl Header {
    /// Builds a header for the smallest representable dictionary size
    /// that is >= `size`.
    pub fn from_dict_size(size: u32) -> Result<Self> {
        if !valid_dict_size(size) {
            return Err(Error::BadDictSize);
        }
        let bits = 32 - (size - 1).leading_zeros(); // ceil(log2(size))
        let mut coded = bits as u8;
        if size > MIN_DICT_SIZE {
            let base = 1u32 << bits;
            let fraction = base / 16;
            for i in (1..=7u32).rev() {
                if base - i * fraction >= size {
                    coded |= (i as u8) << 5;
                    break;
                }
            }
        }
        Ok(Self { coded_dict: coded })
    }

    /// Decodes and validates a 6-byte header.
    pub fn decode(data: &[u8; HEADER_SIZE]) -> Result<Self> {
        if data[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        if data[4] != VERSION {
            return Err(Error::UnsupportedVersion { version: data[4] });
        }
        let header = Self { coded_dict: data[5] };
        if !valid_dict_size(header.dictionary_size()) {
            return Err(Error::BadDictSize);
        }
        Ok(header)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        [MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], VERSION, self.coded_dict]
    }

    /// The dictionary size this header codes for.
    pub fn dictionary_size(&self) -> u32 {
        let bits = (self.coded_dict & 0x1F) as u32;
        if bits > 31 {
            return 0;
        }
        let mut size = 1u32 << bits;
        if size > MIN_DICT_SIZE {
            size -= (size / 16) * ((self.coded_dict >> 5) & 7) as u32;
        }
        size
    }
}

/// A decoded (or to-be-encoded) member trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// CRC-32 of the uncompressed data.
    pub data_crc: u32,
    /// Size of the uncompressed data.
    pub data_size: u64,
    /// Member size including header and trailer.
    pub member_size: u64,
}

impl Trailer {
    pub fn decode(data: &[u8; TRAILER_SIZE]) -> Self {
        Self {
            data_crc: LittleEndian::read_u32(&data[0..4]),
            data_size: LittleEndian::read_u64(&data[4..12]),
            member_size: LittleEndian::read_u64(&data[12..20]),
        }
    }

    pub fn encode(&self) -> [u8; TRAILER_SIZE] {
        let mut data = [0u8; TRAILER_SIZE];
        LittleEndian::write_u32(&mut data[0..4], self.data_crc);
        LittleEndian::write_u64(&mut data[4..12], self.data_size);
        LittleEndian::write_u64(&mut data[12..20], self.member_size);
        data
    }

    /// Internal consistency of the three fields: an empty member has CRC
    /// zero and vice versa, the member size respects the minimum and the
    /// worst-case expansion bound, and the data size respects the best
    /// possible compression ratio.
    pub fn check_consistency(&self) -> bool {
        if (self.data_crc == 0) != (self.data_size == 0) {
            return false;
        }
        if self.member_size < MIN_MEMBER_SIZE {
            return false;
        }
        let dsize = self.data_size as u128;
        let msize = self.member_size as u128;
        let mlimit = (9 * dsize + 7) / 8 + MIN_MEMBER_SIZE as u128;
        if msize > mlimit {
            return false;
        }
        let dlimit = 7090 * (msize - 26) - 1;
        if dsize > dlimit {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_size_coding() {
        // 0xD3 = 2^19 - 6 * 2^15 = 320 KiB
        let header = Header { coded_dict: 0xD3 };
        assert_eq!(header.dictionary_size(), 320 * 1024);

        assert_eq!(Header { coded_dict: 0x0C }.dictionary_size(), 4 * 1024);
        assert_eq!(Header { coded_dict: 0x1D }.dictionary_size(), 512 * 1024 * 1024);

        assert_eq!(Header::from_dict_size(4096).unwrap().coded_dict, 0x0C);
        assert_eq!(Header::from_dict_size(1 << 29).unwrap().coded_dict, 0x1D);
        assert!(Header::from_dict_size(100).is_err());
        assert!(Header::from_dict_size(u32::MAX).is_err());
    }

    #[test]
    fn test_dict_size_round_trip() {
        // Every representable size decodes back to itself; every other
        // size rounds up to the smallest representable one above it.
        for bits in MIN_DICT_BITS..=MAX_DICT_BITS {
            let base = 1u32 << bits;
            for fraction in 0..8u32 {
                let size = base - fraction * (base / 16);
                if !valid_dict_size(size) {
                    continue;
                }
                let header = Header::from_dict_size(size).unwrap();
                assert_eq!(header.dictionary_size(), size, "size {}", size);
            }
        }
        let requested = (1 << 20) + 1;
        let coded = Header::from_dict_size(requested).unwrap().dictionary_size();
        assert!(coded >= requested);
        assert!(coded < (1 << 21));
    }

    #[test]
    fn test_header_decode() {
        let bytes = Header::from_dict_size(1 << 23).unwrap().encode();
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.dictionary_size(), 1 << 23);

        let mut bad = bytes;
        bad[0] = b'X';
        assert!(matches!(Header::decode(&bad), Err(Error::BadMagic)));

        let mut bad = bytes;
        bad[4] = 2;
        assert!(matches!(
            Header::decode(&bad),
            Err(Error::UnsupportedVersion { version: 2 })
        ));

        let mut bad = bytes;
        bad[5] = 0x0B; // 2 KiB, below minimum
        assert!(matches!(Header::decode(&bad), Err(Error::BadDictSize)));
    }

    #[test]
    fn test_magic_checks() {
        assert!(check_prefix(b"L"));
        assert!(check_prefix(b"LZI"));
        assert!(check_prefix(b"LZIP\x01\x0C"));
        assert!(!check_prefix(b""));
        assert!(!check_prefix(b"LZX"));

        assert!(check_corrupt(b"LZIp\x01\x0C")); // 3 of 4 match
        assert!(check_corrupt(b"LZxx\x01\x0C")); // 2 of 4 match
        assert!(!check_corrupt(b"LZIP\x01\x0C")); // all 4 match
        assert!(!check_corrupt(b"xxxx\x01\x0C")); // none match
    }

    #[test]
    fn test_trailer_round_trip() {
        let trailer = Trailer {
            data_crc: 0xDEADBEEF,
            data_size: 123456789,
            member_size: 7777,
        };
        let bytes = trailer.encode();
        assert_eq!(Trailer::decode(&bytes), trailer);

        // Fields are little-endian.
        assert_eq!(bytes[0], 0xEF);
        assert_eq!(bytes[3], 0xDE);
    }

    #[test]
    fn test_trailer_consistency() {
        let ok = Trailer { data_crc: 0x12345678, data_size: 100, member_size: 80 };
        assert!(ok.check_consistency());

        let empty = Trailer { data_crc: 0, data_size: 0, member_size: 36 };
        assert!(empty.check_consistency());

        // Empty data must have CRC zero.
        let bad = Trailer { data_crc: 5, data_size: 0, member_size: 36 };
        assert!(!bad.check_consistency());

        // Minimum member size.
        let bad = Trailer { data_crc: 0, data_size: 0, member_size: 35 };
        assert!(!bad.check_consistency());

        // Expansion bound: member may not exceed ceil(9d/8) + 36.
        let bad = Trailer { data_crc: 1, data_size: 8, member_size: 46 };
        assert!(!bad.check_consistency());
        let ok = Trailer { data_crc: 1, data_size: 8, member_size: 45 };
        assert!(ok.check_consistency());

        // Compression bound: data may not exceed 7090 * (m - 26) - 1.
        let bad = Trailer { data_crc: 1, data_size: 70900, member_size: 36 };
        assert!(!bad.check_consistency());
        let ok = Trailer { data_crc: 1, data_size: 70899, member_size: 36 };
        assert!(ok.check_consistency());
    }
}
