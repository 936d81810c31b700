//! Member index over a seekable file.
//!
//! Built backwards from the end of the file: each trailer names its
//! member's size, which locates the header in front of it. When the
//! bytes at the end are not a valid trailer (trailing data), a block-wise
//! backward scan hunts for the last real member before giving up.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::header::{
    check_corrupt, check_prefix, Header, Trailer, HEADER_SIZE, MIN_MEMBER_SIZE, TRAILER_SIZE,
};
use crate::options::DecodeOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub pos: u64,
    pub size: u64,
}

impl Block {
    pub fn end(&self) -> u64 {
        self.pos + self.size
    }
}

/// One member as seen by the index: where its compressed bytes live, and
/// where its uncompressed bytes fall in the decoded stream.
#[derive(Debug, Clone, Copy)]
pub struct IndexMember {
    pub dblock: Block,
    pub mblock: Block,
    pub dictionary_size: u32,
}

pub struct FileIndex {
    members: Vec<IndexMember>,
    insize: u64,
    dictionary_size: u32,
    multi_empty: bool,
}

fn seek_read<R: Read + Seek>(reader: &mut R, buf: &mut [u8], pos: u64) -> Result<()> {
    reader.seek(SeekFrom::Start(pos))?;
    reader.read_exact(buf)?;
    Ok(())
}

impl FileIndex {
    pub fn new<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Self> {
        let insize = reader.seek(SeekFrom::End(0))?;
        if insize < MIN_MEMBER_SIZE {
            return Err(Error::TooShort);
        }
        if insize > i64::MAX as u64 {
            return Err(Error::TooLong);
        }

        // The first header is checked up front so a file that was never
        // in lzip format reports the real reason.
        let mut hbuf = [0u8; HEADER_SIZE];
        seek_read(reader, &mut hbuf, 0)?;
        Header::decode(&hbuf)?;

        let mut members: Vec<IndexMember> = Vec::new();
        let mut pos = insize; // always at a header boundary or EOF
        while pos >= MIN_MEMBER_SIZE {
            let mut tbuf = [0u8; TRAILER_SIZE];
            seek_read(reader, &mut tbuf, pos - TRAILER_SIZE as u64)?;
            let trailer = Trailer::decode(&tbuf);
            let member_size = trailer.member_size;
            if member_size > pos || !trailer.check_consistency() {
                if members.is_empty() {
                    Self::skip_trailing_data(reader, &mut pos, &mut members, options)?;
                    continue;
                }
                return Err(Error::BadTrailer {
                    pos: pos - TRAILER_SIZE as u64,
                });
            }
            seek_read(reader, &mut hbuf, pos - member_size)?;
            match Header::decode(&hbuf) {
                Ok(header) => {
                    pos -= member_size;
                    members.push(IndexMember {
                        dblock: Block { pos: 0, size: trailer.data_size },
                        mblock: Block { pos, size: member_size },
                        dictionary_size: header.dictionary_size(),
                    });
                }
                Err(_) => {
                    if members.is_empty() {
                        Self::skip_trailing_data(reader, &mut pos, &mut members, options)?;
                        continue;
                    }
                    return Err(Error::BadHeader {
                        pos: pos - member_size,
                    });
                }
            }
        }
        if pos != 0 || members.is_empty() {
            return Err(Error::BadIndex);
        }

        members.reverse();
        let mut acc = 0u64;
        for member in members.iter_mut() {
            member.dblock.pos = acc;
            acc = acc
                .checked_add(member.dblock.size)
                .filter(|end| *end <= i64::MAX as u64)
                .ok_or(Error::DataTooLong)?;
        }

        let multi_empty = members.len() > 1 && members.iter().any(|m| m.dblock.size == 0);
        let dictionary_size = members
            .iter()
            .map(|m| m.dictionary_size)
            .max()
            .unwrap_or(0);

        Ok(Self {
            members,
            insize,
            dictionary_size,
            multi_empty,
        })
    }

    /// Backward scan through possible trailing data. On success the last
    /// real member is pushed and `pos` points at its header.
    fn skip_trailing_data<R: Read + Seek>(
        reader: &mut R,
        pos: &mut u64,
        members: &mut Vec<IndexMember>,
        options: &DecodeOptions,
    ) -> Result<()> {
        const BLOCK_SIZE: usize = 16384;
        const BUFFER_SIZE: usize = BLOCK_SIZE + TRAILER_SIZE - 1 + HEADER_SIZE;
        if *pos < MIN_MEMBER_SIZE {
            return Err(Error::BadIndex);
        }
        let mut buffer = [0u8; BUFFER_SIZE];
        let mut bsize = (*pos % BLOCK_SIZE as u64) as usize; // bytes held
        if bsize <= BUFFER_SIZE - BLOCK_SIZE {
            bsize += BLOCK_SIZE;
        }
        let mut search_size = bsize; // bytes scanned for a trailer
        let mut rd_size = bsize; // bytes read from the file
        let mut ipos = *pos - rd_size as u64; // block-aligned buffer start

        loop {
            seek_read(reader, &mut buffer[..rd_size], ipos)?;
            let max_msb = ((ipos + search_size as u64) >> 56) as u8;
            let mut i = search_size;
            while i >= TRAILER_SIZE {
                // The last byte of a plausible trailer is the most
                // significant byte of member_size; filter on it cheaply.
                if buffer[i - 1] <= max_msb {
                    let mut tbuf = [0u8; TRAILER_SIZE];
                    tbuf.copy_from_slice(&buffer[i - TRAILER_SIZE..i]);
                    let trailer = Trailer::decode(&tbuf);
                    let member_size = trailer.member_size;
                    if member_size == 0 {
                        // Skip runs of zeros in one go.
                        while i > TRAILER_SIZE && buffer[i - 9] == 0 {
                            i -= 1;
                        }
                        i -= 1;
                        continue;
                    }
                    if member_size > ipos + i as u64 || !trailer.check_consistency() {
                        i -= 1;
                        continue;
                    }
                    let mut hbuf = [0u8; HEADER_SIZE];
                    seek_read(reader, &mut hbuf, ipos + i as u64 - member_size)?;
                    let header = match Header::decode(&hbuf) {
                        Ok(h) => h,
                        Err(_) => {
                            i -= 1;
                            continue;
                        }
                    };
                    if check_prefix(&buffer[i..bsize]) {
                        return Err(Error::TruncatedMember);
                    }
                    if !options.loose_trailing
                        && bsize - i >= HEADER_SIZE
                        && check_corrupt(&buffer[i..bsize])
                    {
                        return Err(Error::CorruptHeader);
                    }
                    if !options.ignore_trailing {
                        return Err(Error::TrailingData);
                    }
                    log::debug!(
                        "ignoring {} bytes of trailing data",
                        *pos - (ipos + i as u64)
                    );
                    *pos = ipos + i as u64 - member_size;
                    members.push(IndexMember {
                        dblock: Block { pos: 0, size: trailer.data_size },
                        mblock: Block { pos: *pos, size: member_size },
                        dictionary_size: header.dictionary_size(),
                    });
                    return Ok(());
                }
                i -= 1;
            }
            if ipos == 0 {
                return Err(Error::BadTrailer {
                    pos: *pos - TRAILER_SIZE as u64,
                });
            }
            bsize = BUFFER_SIZE;
            search_size = bsize - HEADER_SIZE;
            rd_size = BLOCK_SIZE;
            ipos -= BLOCK_SIZE as u64;
            buffer.copy_within(..BUFFER_SIZE - rd_size, rd_size);
        }
    }

    pub fn members(&self) -> &[IndexMember] {
        &self.members
    }

    /// Total uncompressed size.
    pub fn udata_size(&self) -> u64 {
        self.members.last().map(|m| m.dblock.end()).unwrap_or(0)
    }

    /// Total compressed size, excluding trailing data.
    pub fn cdata_size(&self) -> u64 {
        self.members.last().map(|m| m.mblock.end()).unwrap_or(0)
    }

    /// On-disk file size, including trailing data.
    pub fn file_size(&self) -> u64 {
        self.insize
    }

    /// Largest dictionary size used by any member.
    pub fn dictionary_size(&self) -> u32 {
        self.dictionary_size
    }

    /// True when a multimember file contains an empty member.
    pub fn multi_empty(&self) -> bool {
        self.multi_empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_member(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        crate::compress(
            data,
            &mut out,
            &crate::EncoderOptions::default(),
            false,
            crate::DEFAULT_MEMBER_SIZE,
        )
        .unwrap();
        out
    }

    #[test]
    fn test_single_member_index() {
        let data = b"The quick brown fox jumps over the lazy dog.\n";
        let file = sample_member(data);
        let mut cursor = Cursor::new(file.clone());
        let index = FileIndex::new(&mut cursor, &DecodeOptions::default()).unwrap();
        assert_eq!(index.members().len(), 1);
        assert_eq!(index.udata_size(), data.len() as u64);
        assert_eq!(index.cdata_size(), file.len() as u64);
        assert_eq!(index.file_size(), file.len() as u64);
        assert!(!index.multi_empty());
    }

    #[test]
    fn test_multimember_positions() {
        let a = b"first member payload";
        let b = b"second";
        let mut file = sample_member(a);
        let first_len = file.len() as u64;
        file.extend_from_slice(&sample_member(b));
        let mut cursor = Cursor::new(file);
        let index = FileIndex::new(&mut cursor, &DecodeOptions::default()).unwrap();
        assert_eq!(index.members().len(), 2);
        assert_eq!(index.members()[0].dblock.pos, 0);
        assert_eq!(index.members()[0].dblock.size, a.len() as u64);
        assert_eq!(index.members()[1].dblock.pos, a.len() as u64);
        assert_eq!(index.members()[1].dblock.size, b.len() as u64);
        assert_eq!(index.members()[1].mblock.pos, first_len);
    }

    #[test]
    fn test_trailing_data_policies() {
        let mut file = sample_member(b"payload");
        file.extend_from_slice(b"some trailing garbage");

        let mut cursor = Cursor::new(file.clone());
        let index = FileIndex::new(&mut cursor, &DecodeOptions::default()).unwrap();
        assert_eq!(index.members().len(), 1);

        let strict = DecodeOptions {
            ignore_trailing: false,
            ..DecodeOptions::default()
        };
        let mut cursor = Cursor::new(file);
        assert!(matches!(
            FileIndex::new(&mut cursor, &strict),
            Err(Error::TrailingData)
        ));
    }

    #[test]
    fn test_trailing_magic_rejected() {
        let mut file = sample_member(b"payload");
        file.extend_from_slice(b"LZIP");
        let mut cursor = Cursor::new(file);
        // A magic prefix after the last member looks like a truncated
        // member, never like ignorable garbage.
        assert!(matches!(
            FileIndex::new(&mut cursor, &DecodeOptions::default()),
            Err(Error::TruncatedMember)
        ));
    }

    #[test]
    fn test_corrupt_header_trailing() {
        let mut file = sample_member(b"payload");
        file.extend_from_slice(b"LZIp\x01\x0C");
        let mut cursor = Cursor::new(file.clone());
        assert!(matches!(
            FileIndex::new(&mut cursor, &DecodeOptions::default()),
            Err(Error::CorruptHeader)
        ));

        let loose = DecodeOptions {
            loose_trailing: true,
            ..DecodeOptions::default()
        };
        let mut cursor = Cursor::new(file);
        let index = FileIndex::new(&mut cursor, &loose).unwrap();
        assert_eq!(index.members().len(), 1);
    }

    #[test]
    fn test_not_lzip_data() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            FileIndex::new(&mut cursor, &DecodeOptions::default()),
            Err(Error::BadMagic)
        ));

        let mut cursor = Cursor::new(vec![0u8; 10]);
        assert!(matches!(
            FileIndex::new(&mut cursor, &DecodeOptions::default()),
            Err(Error::TooShort)
        ));
    }
}
