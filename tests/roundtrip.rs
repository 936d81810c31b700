//! End-to-end tests over in-memory streams: round trips at every level,
//! trailer contents, concatenation, truncation, trailing-data policies,
//! and the member index against a forward scan.

use std::io::Cursor;
use std::io::Write;

use rlzip::checksum::Crc32;
use rlzip::header::{Header, Trailer, HEADER_SIZE, TRAILER_SIZE};
use rlzip::{
    compress, compress_to_vec, decompress, decompress_to_vec, DecodeOptions, EncoderOptions, Error,
    FileIndex, DEFAULT_MEMBER_SIZE,
};

const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog.\n";

fn default_opts() -> DecodeOptions {
    DecodeOptions::default()
}

/// Deterministic pseudo-random bytes, moderately compressible.
fn mixed_data(len: usize) -> Vec<u8> {
    let mut state = 0x2545F491u64;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        if state & 3 == 0 {
            // Sprinkle repeated phrases so matches exist.
            out.extend_from_slice(b"repeated phrase ");
        } else {
            out.push((state >> 33) as u8);
        }
    }
    out.truncate(len);
    out
}

#[test]
fn test_round_trip_fox_all_levels() {
    for level in 0..=9 {
        let compressed = compress_to_vec(FOX, level).unwrap();
        let restored = decompress_to_vec(&compressed, &default_opts()).unwrap();
        assert_eq!(restored, FOX, "level {}", level);
    }
}

#[test]
fn test_round_trip_shapes() {
    let shapes: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![b'x'],
        vec![0u8; 10_000],
        (0u8..=255).cycle().take(4096).collect(),
        b"aaaaaaaaaabbbbbbbbbbaaaaaaaaaab".repeat(200),
        mixed_data(60_000),
    ];
    for (i, data) in shapes.iter().enumerate() {
        for level in [0, 1, 6] {
            let compressed = compress_to_vec(data, level).unwrap();
            let restored = decompress_to_vec(&compressed, &default_opts()).unwrap();
            assert_eq!(&restored, data, "shape {} level {}", i, level);
        }
    }
}

#[test]
fn test_round_trip_custom_parameters() {
    // A dictionary smaller than the data forces window wrap-around.
    let data = mixed_data(40_000);
    for (dict, mll) in [(1 << 12, 5), (1 << 12, 273), (6144, 16), (1 << 16, 36)] {
        let options = EncoderOptions {
            dictionary_size: dict,
            match_len_limit: mll,
        };
        let mut compressed = Vec::new();
        compress(&data[..], &mut compressed, &options, false, DEFAULT_MEMBER_SIZE).unwrap();
        let restored = decompress_to_vec(&compressed, &default_opts()).unwrap();
        assert_eq!(restored, data, "dict {} mll {}", dict, mll);

        let mut compressed = Vec::new();
        compress(&data[..], &mut compressed, &options, true, DEFAULT_MEMBER_SIZE).unwrap();
        let restored = decompress_to_vec(&compressed, &default_opts()).unwrap();
        assert_eq!(restored, data, "fast dict {} mll {}", dict, mll);
    }
}

#[test]
fn test_empty_input_member_shape() {
    for level in [0, 6] {
        let compressed = compress_to_vec(b"", level).unwrap();
        assert_eq!(compressed.len(), 36, "level {}", level);

        // Header: magic, version 1, coded dictionary size 4 KiB.
        assert_eq!(&compressed[..4], b"LZIP");
        assert_eq!(compressed[4], 1);
        assert_eq!(compressed[5], 0x0C);

        let mut tbuf = [0u8; TRAILER_SIZE];
        tbuf.copy_from_slice(&compressed[compressed.len() - TRAILER_SIZE..]);
        let trailer = Trailer::decode(&tbuf);
        assert_eq!(trailer.data_crc, 0);
        assert_eq!(trailer.data_size, 0);
        assert_eq!(trailer.member_size, 36);

        assert_eq!(decompress_to_vec(&compressed, &default_opts()).unwrap(), b"");
    }
}

#[test]
fn test_empty_member_policy() {
    let compressed = compress_to_vec(b"", 6).unwrap();
    let strict = DecodeOptions {
        ignore_empty: false,
        ..default_opts()
    };
    assert!(matches!(
        decompress_to_vec(&compressed, &strict),
        Err(Error::EmptyMember)
    ));
}

#[test]
fn test_trailer_fields_match_data() {
    let data = mixed_data(20_000);
    let compressed = compress_to_vec(&data, 6).unwrap();

    let mut tbuf = [0u8; TRAILER_SIZE];
    tbuf.copy_from_slice(&compressed[compressed.len() - TRAILER_SIZE..]);
    let trailer = Trailer::decode(&tbuf);
    assert_eq!(trailer.data_crc, Crc32::compute(&data));
    assert_eq!(trailer.data_size, data.len() as u64);
    assert_eq!(trailer.member_size, compressed.len() as u64);
    assert!(trailer.check_consistency());

    // The coded dictionary size shrank to the data size, rounded up to a
    // representable value.
    let mut hbuf = [0u8; HEADER_SIZE];
    hbuf.copy_from_slice(&compressed[..HEADER_SIZE]);
    let header = Header::decode(&hbuf).unwrap();
    assert!(header.dictionary_size() >= data.len() as u32);
}

#[test]
fn test_concatenated_members() {
    let a = FOX;
    let b = mixed_data(5000);
    let mut file = compress_to_vec(a, 6).unwrap();
    file.extend_from_slice(&compress_to_vec(&b, 1).unwrap());

    let restored = decompress_to_vec(&file, &default_opts()).unwrap();
    let mut expected = a.to_vec();
    expected.extend_from_slice(&b);
    assert_eq!(restored, expected);
}

#[test]
fn test_member_size_limit_splits_output() {
    let data = mixed_data(30_000);
    let mut compressed = Vec::new();
    compress(
        &data[..],
        &mut compressed,
        &EncoderOptions::default(),
        false,
        2000,
    )
    .unwrap();

    let mut cursor = Cursor::new(compressed.clone());
    let index = FileIndex::new(&mut cursor, &default_opts()).unwrap();
    assert!(index.members().len() > 1);
    for member in index.members() {
        assert!(member.mblock.size <= 2000);
    }
    assert_eq!(index.udata_size(), data.len() as u64);
    assert_eq!(index.cdata_size(), compressed.len() as u64);

    let restored = decompress_to_vec(&compressed, &default_opts()).unwrap();
    assert_eq!(restored, data);
}

#[test]
fn test_index_matches_forward_scan() {
    // Forward scan: decode each member and record its sizes; the backward
    // index must report the same pairs.
    let inputs: [&[u8]; 3] = [FOX, b"", b"another member with other content"];
    let mut file = Vec::new();
    let mut expected = Vec::new();
    for input in inputs {
        let member = compress_to_vec(input, 2).unwrap();
        expected.push((input.len() as u64, member.len() as u64));
        file.extend_from_slice(&member);
    }

    let mut cursor = Cursor::new(file.clone());
    let index = FileIndex::new(&mut cursor, &default_opts()).unwrap();
    let reported: Vec<(u64, u64)> = index
        .members()
        .iter()
        .map(|m| (m.dblock.size, m.mblock.size))
        .collect();
    assert_eq!(reported, expected);
    assert!(index.multi_empty());

    let restored = decompress_to_vec(&file, &default_opts()).unwrap();
    let expected_data: Vec<u8> = inputs.concat();
    assert_eq!(restored, expected_data);
}

#[test]
fn test_every_truncation_fails() {
    let compressed = compress_to_vec(FOX, 6).unwrap();
    for cut in 0..compressed.len() {
        let err = decompress_to_vec(&compressed[..cut], &default_opts()).unwrap_err();
        assert_eq!(err.exit_code(), 2, "cut {} gave {:?}", cut, err);
    }
}

#[test]
fn test_flipped_bytes_fail() {
    let compressed = compress_to_vec(FOX, 6).unwrap();
    // The last byte sits in the trailer's member_size field.
    let mut corrupt = compressed.clone();
    *corrupt.last_mut().unwrap() ^= 0x01;
    let err = decompress_to_vec(&corrupt, &default_opts()).unwrap_err();
    assert_eq!(err.exit_code(), 2);

    // The stored CRC differs from the data's CRC.
    let mut corrupt = compressed.clone();
    let crc_pos = compressed.len() - TRAILER_SIZE;
    corrupt[crc_pos] ^= 0xFF;
    assert!(matches!(
        decompress_to_vec(&corrupt, &default_opts()),
        Err(Error::TrailerMismatch { .. })
    ));

    // A corrupted payload byte is caught one way or another.
    let mut corrupt = compressed;
    let mid = HEADER_SIZE + 8;
    corrupt[mid] ^= 0x10;
    let err = decompress_to_vec(&corrupt, &default_opts()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_trailing_data_policies() {
    let mut file = compress_to_vec(FOX, 6).unwrap();
    file.extend_from_slice(b"garbage after the member");

    let restored = decompress_to_vec(&file, &default_opts()).unwrap();
    assert_eq!(restored, FOX);

    let strict = DecodeOptions {
        ignore_trailing: false,
        ..default_opts()
    };
    assert!(matches!(
        decompress_to_vec(&file, &strict),
        Err(Error::TrailingData)
    ));
}

#[test]
fn test_trailing_magic_always_rejected() {
    let mut file = compress_to_vec(FOX, 6).unwrap();
    file.extend_from_slice(b"LZIP");
    assert!(matches!(
        decompress_to_vec(&file, &default_opts()),
        Err(Error::TruncatedHeader)
    ));
}

#[test]
fn test_trailing_corrupt_header() {
    let mut file = compress_to_vec(FOX, 6).unwrap();
    file.extend_from_slice(b"LZIp\x01\x0C");
    assert!(matches!(
        decompress_to_vec(&file, &default_opts()),
        Err(Error::CorruptHeader)
    ));

    let loose = DecodeOptions {
        loose_trailing: true,
        ..default_opts()
    };
    assert_eq!(decompress_to_vec(&file, &loose).unwrap(), FOX);
}

#[test]
fn test_marking_byte_policy() {
    let mut file = compress_to_vec(FOX, 6).unwrap();
    // Byte 6 is the discarded first byte of the LZMA stream.
    file[HEADER_SIZE] = 0x55;
    assert_eq!(decompress_to_vec(&file, &default_opts()).unwrap(), FOX);

    let strict = DecodeOptions {
        ignore_marking: false,
        ..default_opts()
    };
    assert!(matches!(
        decompress_to_vec(&file, &strict),
        Err(Error::MarkedMember)
    ));
}

#[test]
fn test_garbage_input_rejected() {
    // Not lzip at all.
    let err = decompress_to_vec(&[0u8; 100], &default_opts()).unwrap_err();
    assert!(matches!(err, Error::BadMagic));

    // The minimum member size of zero bytes is a bad header, not an
    // empty member.
    let err = decompress_to_vec(&[0u8; 36], &default_opts()).unwrap_err();
    assert!(matches!(err, Error::BadMagic));
    let mut cursor = Cursor::new(vec![0u8; 36]);
    assert!(matches!(
        FileIndex::new(&mut cursor, &default_opts()),
        Err(Error::BadMagic)
    ));
}

#[test]
fn test_testing_is_repeatable_and_silent() {
    let compressed = compress_to_vec(FOX, 6).unwrap();
    let first = decompress(&compressed[..], None, &default_opts()).unwrap();
    let second = decompress(&compressed[..], None, &default_opts()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, FOX.len() as u64);
}

#[test]
fn test_unexpected_eof_position_is_file_length() {
    let compressed = compress_to_vec(FOX, 6).unwrap();
    // A cut inside the trailer always fails the trailer check.
    let cut = compressed.len() - 5;
    assert!(matches!(
        decompress_to_vec(&compressed[..cut], &default_opts()),
        Err(Error::TrailerMismatch { .. })
    ));
    // Cuts inside the payload either run out of input (reported at the
    // byte offset where the file ends) or trip another integrity check.
    for cut in [HEADER_SIZE + 8, compressed.len() - TRAILER_SIZE - 2] {
        match decompress_to_vec(&compressed[..cut], &default_opts()) {
            Err(Error::UnexpectedEof { pos }) => assert_eq!(pos, cut as u64),
            Err(e) => assert_eq!(e.exit_code(), 2, "cut {} gave {:?}", cut, e),
            Ok(out) => panic!("cut {} decoded {} bytes", cut, out.len()),
        }
    }
}

#[test]
fn test_decompress_still_writes_before_crc_error() {
    // A wrong stored CRC is detected only after the data was emitted.
    let data = FOX;
    let mut compressed = compress_to_vec(data, 6).unwrap();
    let crc_pos = compressed.len() - TRAILER_SIZE;
    compressed[crc_pos] ^= 0xFF;

    let mut out = Vec::new();
    let result = decompress(
        &compressed[..],
        Some(&mut out as &mut dyn Write),
        &default_opts(),
    );
    assert!(matches!(result, Err(Error::TrailerMismatch { .. })));
    assert_eq!(out, data);
}
