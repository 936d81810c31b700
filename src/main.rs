//! Command-line driver: compress, decompress, test, and list lzip files.
//!
//! Exit status: 0 for a normal exit, 1 for environmental problems (file
//! not found, invalid options, I/O errors), 2 for a corrupt or invalid
//! input file, 3 for an internal consistency error.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use clap::{ArgAction, Parser};

use rlzip::header::{MAX_DICT_BITS, MAX_DICT_SIZE, MIN_DICT_BITS, MIN_DICT_SIZE};
use rlzip::{
    codecs::{MATCH_LEN_MAX, MIN_MATCH_LEN_LIMIT},
    encoder::Encoder,
    DecodeOptions, EncoderOptions, Error, FileIndex, DEFAULT_MEMBER_SIZE, MAX_VOLUME_SIZE,
};

const PROGRAM: &str = "rlzip";

const KNOWN_EXTENSIONS: [(&str, &str); 2] = [(".lz", ""), (".tlz", ".tar")];

/// Lossless data compressor for the lzip format
#[derive(Parser)]
#[command(name = PROGRAM, version, disable_help_subcommand = true)]
#[command(about = "Lossless data compressor based on the LZMA algorithm (lzip format)")]
struct Cli {
    /// Alias for the fastest compression level
    #[arg(short = '0', long = "fast")]
    level0: bool,
    #[arg(short = '1', hide = true)]
    level1: bool,
    #[arg(short = '2', hide = true)]
    level2: bool,
    #[arg(short = '3', hide = true)]
    level3: bool,
    #[arg(short = '4', hide = true)]
    level4: bool,
    #[arg(short = '5', hide = true)]
    level5: bool,
    #[arg(short = '6', hide = true)]
    level6: bool,
    #[arg(short = '7', hide = true)]
    level7: bool,
    #[arg(short = '8', hide = true)]
    level8: bool,
    /// Alias for the best compression level
    #[arg(short = '9', long = "best")]
    level9: bool,

    /// Exit with error status if trailing data is found
    #[arg(short = 'a', long = "trailing-error")]
    trailing_error: bool,

    /// Set member size limit in bytes
    #[arg(short = 'b', long = "member-size", value_name = "BYTES", value_parser = parse_size)]
    member_size: Option<u64>,

    /// Write to standard output, keep input files
    #[arg(short = 'c', long = "stdout")]
    to_stdout: bool,

    /// Decompress
    #[arg(short = 'd', long = "decompress")]
    decompress: bool,

    /// Overwrite existing output files
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Force re-compression of files with a known suffix
    #[arg(short = 'F', long = "recompress")]
    recompress: bool,

    /// Keep (don't delete) input files
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Print (un)compressed file sizes
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Set match length limit in bytes [36]
    #[arg(short = 'm', long = "match-length", value_name = "BYTES", value_parser = parse_size)]
    match_length: Option<u64>,

    /// Write output to FILE, keep input files
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Suppress all messages
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Set dictionary size limit in bytes [8 MiB]; 12..29 mean powers of 2
    #[arg(short = 's', long = "dictionary-size", value_name = "BYTES", value_parser = parse_size)]
    dictionary_size: Option<u64>,

    /// Set volume size limit in bytes
    #[arg(short = 'S', long = "volume-size", value_name = "BYTES", value_parser = parse_size)]
    volume_size: Option<u64>,

    /// Test compressed file integrity
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Be verbose (a second -v gives more)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Exit with error status if an empty member is found
    #[arg(long = "empty-error")]
    empty_error: bool,

    /// Exit with error status if the first LZMA byte is not zero
    #[arg(long = "marking-error")]
    marking_error: bool,

    /// Allow trailing data that resembles a corrupt header
    #[arg(long = "loose-trailing")]
    loose_trailing: bool,

    /// Files to process; '-' or no names means standard input
    files: Vec<String>,
}

/// Accepts SI (k, M, G, ...) and binary (Ki, Mi, Gi, ...) multipliers.
fn parse_size(arg: &str) -> Result<u64, String> {
    let digits_end = arg
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(arg.len());
    if digits_end == 0 {
        return Err(format!("bad or missing numerical argument '{}'", arg));
    }
    let mut value: u64 = arg[..digits_end]
        .parse()
        .map_err(|_| format!("bad numerical argument '{}'", arg))?;
    let suffix = &arg[digits_end..];
    if suffix.is_empty() {
        return Ok(value);
    }
    let mut chars = suffix.chars();
    let letter = chars.next().unwrap();
    let binary = chars.next() == Some('i');
    if chars.next().is_some() {
        return Err(format!("bad multiplier in numerical argument '{}'", arg));
    }
    let factor: u64 = if binary { 1024 } else { 1000 };
    let exponent = match letter {
        'k' if !binary => 1,
        'K' if binary => 1,
        'M' => 2,
        'G' => 3,
        'T' => 4,
        'P' => 5,
        'E' => 6,
        'Z' => 7,
        'Y' => 8,
        'R' => 9,
        'Q' => 10,
        _ => 0,
    };
    if exponent == 0 {
        return Err(format!("bad multiplier in numerical argument '{}'", arg));
    }
    for _ in 0..exponent {
        value = value
            .checked_mul(factor)
            .ok_or_else(|| format!("value out of limits '{}'", arg))?;
    }
    Ok(value)
}

fn show_file_error(name: &str, msg: &dyn std::fmt::Display) {
    eprintln!("{}: {}: {}", PROGRAM, name, msg);
}

fn show_error(msg: &dyn std::fmt::Display) {
    eprintln!("{}: {}", PROGRAM, msg);
}

fn set_retval(retval: &mut i32, new_val: i32) {
    if *retval < new_val {
        *retval = new_val;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Compress,
    Decompress,
    Test,
    List,
}

fn extension_index(name: &str) -> Option<usize> {
    KNOWN_EXTENSIONS
        .iter()
        .position(|(from, _)| name.len() > from.len() && name.ends_with(from))
}

/// Output name for compression: `name.lz`, or `name00001.lz` for the
/// first volume of a multivolume output.
fn compressed_name(name: &str, multifile: bool) -> String {
    let mut out = name.to_string();
    if multifile {
        out.push_str("00001");
    }
    out.push_str(KNOWN_EXTENSIONS[0].0);
    out
}

/// Output name for decompression: strip or translate a known suffix.
fn decompressed_name(name: &str) -> String {
    match extension_index(name) {
        Some(i) => {
            let (from, to) = KNOWN_EXTENSIONS[i];
            format!("{}{}", &name[..name.len() - from.len()], to)
        }
        None => {
            let out = format!("{}.out", name);
            show_error(&format!(
                "{}: Can't guess original name -- using '{}'",
                name, out
            ));
            out
        }
    }
}

/// Advances `name00001.lz` to `name00002.lz`; false when the five-digit
/// counter is exhausted.
fn next_filename(name: &mut String) -> bool {
    let ext_len = KNOWN_EXTENSIONS[0].0.len();
    if name.len() < ext_len + 5 {
        return false;
    }
    let mut bytes = std::mem::take(name).into_bytes();
    let start = bytes.len() - ext_len - 1;
    let mut carried_out = true;
    for j in 0..5 {
        let i = start - j;
        if bytes[i] < b'9' {
            bytes[i] += 1;
            carried_out = false;
            break;
        }
        bytes[i] = b'0';
    }
    // Only ASCII digits were touched.
    *name = String::from_utf8(bytes).unwrap_or_default();
    !carried_out
}

fn open_output(path: &str, force: bool) -> io::Result<File> {
    if force {
        File::create(path)
    } else {
        File::options().write(true).create_new(true).open(path)
    }
}

fn format_ds(dictionary_size: u32) -> String {
    let mut num = dictionary_size;
    let mut prefix = "";
    let mut exact = num % 1024 == 0;
    for p in ["Ki", "Mi", "Gi"] {
        if num > 9999 || (exact && num >= 1024) {
            num /= 1024;
            if num % 1024 != 0 {
                exact = false;
            }
            prefix = p;
        } else {
            break;
        }
    }
    format!("{:>4} {}B", num, prefix)
}

fn list_line(uncomp: u64, comp: u64, name: &str) {
    if uncomp > 0 {
        println!(
            "{:14} {:14} {:6.2}%  {}",
            uncomp,
            comp,
            100.0 - (100.0 * comp as f64) / uncomp as f64,
            name
        );
    } else {
        println!("{:14} {:14}   -INF%  {}", uncomp, comp, name);
    }
}

fn list_files(files: &[String], options: &DecodeOptions, verbosity: i32) -> i32 {
    let mut retval = 0;
    let mut first_post = true;
    let mut total_comp = 0u64;
    let mut total_uncomp = 0u64;
    let mut counted = 0;
    for name in files {
        if name == "-" {
            show_file_error("(stdin)", &Error::NotSeekable);
            set_retval(&mut retval, 1);
            continue;
        }
        let mut file = match File::open(name) {
            Ok(f) => f,
            Err(e) => {
                show_file_error(name, &format!("Can't open input file: {}", e));
                set_retval(&mut retval, 1);
                continue;
            }
        };
        let index = match FileIndex::new(&mut file, options) {
            Ok(index) => index,
            Err(e) => {
                show_file_error(name, &e);
                set_retval(&mut retval, e.exit_code());
                continue;
            }
        };
        let multi_empty = index.multi_empty();
        if multi_empty {
            set_retval(&mut retval, 2);
        }
        if verbosity < 0 {
            continue;
        }
        let udata_size = index.udata_size();
        let cdata_size = index.cdata_size();
        total_uncomp += udata_size;
        total_comp += cdata_size;
        counted += 1;
        if first_post {
            first_post = false;
            if verbosity >= 1 {
                print!("   dict   memb  trail ");
            }
            println!("  uncompressed     compressed   saved  name");
        }
        if multi_empty {
            io::stdout().flush().ok();
            show_file_error(name, &Error::EmptyMember);
        }
        if verbosity >= 1 {
            print!(
                "{} {:5} {:6} ",
                format_ds(index.dictionary_size()),
                index.members().len(),
                index.file_size() - cdata_size
            );
        }
        list_line(udata_size, cdata_size, name);

        if verbosity >= 2 && index.members().len() > 1 {
            println!(
                " member      data_pos      data_size     member_pos    member_size"
            );
            for (i, m) in index.members().iter().enumerate() {
                println!(
                    "{:6} {:14} {:14} {:14} {:14}",
                    i + 1,
                    m.dblock.pos,
                    m.dblock.size,
                    m.mblock.pos,
                    m.mblock.size
                );
            }
            first_post = true; // reprint the heading after a member table
        }
    }
    if verbosity >= 0 && counted > 1 {
        if verbosity >= 1 {
            print!("                      ");
        }
        list_line(total_uncomp, total_comp, "(totals)");
    }
    retval
}

struct CompressParams {
    options: EncoderOptions,
    fast: bool,
    member_size: u64,
    volume_size: u64,
    force: bool,
}

/// Compresses one input stream, handling member and volume limits. On
/// volume rollover the output file is swapped under the encoder.
/// `current_path` always names the file being written, so a failure can
/// remove the partial output.
fn do_compress(
    input: Box<dyn Read>,
    writer: Box<dyn Write>,
    params: &CompressParams,
    current_path: &mut Option<String>,
) -> rlzip::Result<(u64, u64)> {
    let mut encoder = if params.fast {
        Encoder::new_fast(input, writer, params.options)?
    } else {
        Encoder::new_normal(input, writer, params.options)?
    };
    let mut in_size = 0u64;
    let mut out_size = 0u64;
    let mut partial_volume = 0u64;
    loop {
        let limit = if params.volume_size > 0 {
            params.member_size.min(params.volume_size - partial_volume)
        } else {
            params.member_size
        };
        let finished = encoder.encode_member(limit)?;
        in_size += encoder.data_position();
        out_size += encoder.member_position();
        if finished {
            return Ok((in_size, out_size));
        }
        if params.volume_size > 0 {
            partial_volume += encoder.member_position();
            if partial_volume >= params.volume_size - MIN_DICT_SIZE as u64 {
                partial_volume = 0;
                if let Some(path) = current_path.as_mut() {
                    if !next_filename(path) {
                        return Err(Error::InvalidOptions("Too many volume files.".into()));
                    }
                    let next = open_output(path, params.force)?;
                    // The finished volume's handle is dropped here.
                    encoder.replace_writer(Box::new(next));
                }
            }
        }
        encoder.reset();
    }
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { 1 } else { 0 };
        }
    };

    let verbosity: i32 = if cli.quiet { -1 } else { cli.verbose as i32 };
    env_logger::Builder::new()
        .filter_level(match verbosity {
            i32::MIN..=-1 => log::LevelFilter::Off,
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp(None)
        .init();

    let mut mode = Mode::Compress;
    let mut mode_count = 0;
    if cli.decompress {
        mode = Mode::Decompress;
        mode_count += 1;
    }
    if cli.test {
        mode = Mode::Test;
        mode_count += 1;
    }
    if cli.list {
        mode = Mode::List;
        mode_count += 1;
    }
    if mode_count > 1 {
        show_error(&"Only one operation can be specified.");
        return 1;
    }

    let decode_options = DecodeOptions {
        ignore_empty: !cli.empty_error,
        ignore_marking: !cli.marking_error,
        ignore_trailing: !cli.trailing_error,
        loose_trailing: cli.loose_trailing,
    };

    let levels = [
        cli.level0, cli.level1, cli.level2, cli.level3, cli.level4, cli.level5, cli.level6,
        cli.level7, cli.level8, cli.level9,
    ];
    let level = levels
        .iter()
        .rposition(|&set| set)
        .unwrap_or(6) as u32;
    let mut encoder_options = match EncoderOptions::from_level(level) {
        Ok(options) => options,
        Err(e) => {
            show_error(&e);
            return 1;
        }
    };
    let mut fast = level == 0;
    if let Some(size) = cli.dictionary_size {
        let size = if (MIN_DICT_BITS as u64..=MAX_DICT_BITS as u64).contains(&size) {
            1u64 << size
        } else {
            size
        };
        if !(MIN_DICT_SIZE as u64..=MAX_DICT_SIZE as u64).contains(&size) {
            show_error(&"Invalid dictionary size.");
            return 1;
        }
        encoder_options.dictionary_size = size as u32;
        fast = false;
    }
    if let Some(len) = cli.match_length {
        if !(MIN_MATCH_LEN_LIMIT as u64..=MATCH_LEN_MAX as u64).contains(&len) {
            show_error(&"Invalid match length limit.");
            return 1;
        }
        encoder_options.match_len_limit = len as u32;
        fast = false;
    }
    let member_size = cli.member_size.unwrap_or(DEFAULT_MEMBER_SIZE);
    if !(100_000..=DEFAULT_MEMBER_SIZE).contains(&member_size) {
        show_error(&"Member size out of limits.");
        return 1;
    }
    let volume_size = if mode == Mode::Compress {
        cli.volume_size.unwrap_or(0)
    } else {
        0
    };
    if volume_size > 0 && !(100_000..=MAX_VOLUME_SIZE).contains(&volume_size) {
        show_error(&"Volume size out of limits.");
        return 1;
    }

    let mut files = cli.files.clone();
    if files.is_empty() {
        files.push("-".to_string());
    }

    if mode == Mode::List {
        return list_files(&files, &decode_options, verbosity);
    }

    let to_stdout = cli.to_stdout || cli.output.as_deref() == Some("-");
    let output_name = cli.output.clone().filter(|o| o.as_str() != "-");
    let one_to_one = !to_stdout && mode != Mode::Test && output_name.is_none();
    let params = CompressParams {
        options: encoder_options,
        fast,
        member_size,
        volume_size,
        force: cli.force,
    };

    let mut retval = 0;
    let mut stdin_used = false;
    for name in &files {
        let from_stdin = name == "-";
        if from_stdin {
            if stdin_used {
                continue;
            }
            stdin_used = true;
        }

        // Open the input.
        let input: Box<dyn Read> = if from_stdin {
            Box::new(io::stdin())
        } else {
            if mode == Mode::Compress && !cli.recompress && extension_index(name).is_some() {
                show_file_error(name, &"Input file already has a known suffix.");
                set_retval(&mut retval, 1);
                continue;
            }
            match File::open(name) {
                Ok(f) => Box::new(f),
                Err(e) => {
                    show_file_error(name, &format!("Can't open input file: {}", e));
                    set_retval(&mut retval, 1);
                    continue;
                }
            }
        };

        // Work out where the output goes.
        let mut current_path: Option<String> = None;
        let result: rlzip::Result<()> = match mode {
            Mode::Compress => {
                let writer: Box<dyn Write> = if to_stdout || (from_stdin && output_name.is_none())
                {
                    Box::new(io::stdout())
                } else {
                    let path = match &output_name {
                        Some(o) => {
                            if volume_size > 0 {
                                compressed_name(o, true)
                            } else {
                                o.clone()
                            }
                        }
                        None => compressed_name(name, volume_size > 0),
                    };
                    match open_output(&path, cli.force) {
                        Ok(f) => {
                            current_path = Some(path);
                            Box::new(f)
                        }
                        Err(e) => {
                            show_file_error(&path, &format!("Can't create output file: {}", e));
                            set_retval(&mut retval, 1);
                            continue;
                        }
                    }
                };
                do_compress(input, writer, &params, &mut current_path).map(|(in_size, out_size)| {
                    if verbosity >= 1 && in_size > 0 && out_size > 0 {
                        eprintln!(
                            "{}: {}: {:.3}:1, {:5.2}% ratio, {:5.2}% saved, {} in, {} out.",
                            PROGRAM,
                            name,
                            in_size as f64 / out_size as f64,
                            (100.0 * out_size as f64) / in_size as f64,
                            100.0 - (100.0 * out_size as f64) / in_size as f64,
                            in_size,
                            out_size
                        );
                    }
                })
            }
            Mode::Decompress => {
                let mut writer: Box<dyn Write> = if to_stdout || (from_stdin && output_name.is_none())
                {
                    Box::new(io::stdout())
                } else {
                    let path = match &output_name {
                        Some(o) => o.clone(),
                        None => decompressed_name(name),
                    };
                    match open_output(&path, cli.force) {
                        Ok(f) => {
                            current_path = Some(path);
                            Box::new(f)
                        }
                        Err(e) => {
                            show_file_error(&path, &format!("Can't create output file: {}", e));
                            set_retval(&mut retval, 1);
                            continue;
                        }
                    }
                };
                rlzip::decompress(input, Some(writer.as_mut()), &decode_options).map(|_| ())
            }
            Mode::Test => rlzip::decompress(input, None, &decode_options).map(|_| ()),
            Mode::List => unreachable!(),
        };

        match result {
            Ok(()) => {
                if verbosity >= 1 && matches!(mode, Mode::Decompress | Mode::Test) {
                    eprintln!(
                        "{}: {}: {}",
                        PROGRAM,
                        name,
                        if mode == Mode::Test { "ok" } else { "done" }
                    );
                }
                // One-to-one (de)compression replaces the input.
                if one_to_one && !from_stdin && !cli.keep && volume_size == 0 {
                    if let Err(e) = fs::remove_file(name) {
                        show_file_error(name, &format!("Can't delete input file: {}", e));
                        set_retval(&mut retval, 1);
                    }
                }
            }
            Err(e) => {
                show_file_error(name, &e);
                set_retval(&mut retval, e.exit_code());
                // Drop the partial output of the failed file.
                if let Some(path) = &current_path {
                    if Path::new(path).exists() {
                        show_file_error(path, &"Deleting output file, if it exists.");
                        let _ = fs::remove_file(path);
                    }
                }
                if mode != Mode::Test {
                    return retval;
                }
            }
        }
    }
    retval
}

fn main() {
    let code = match std::panic::catch_unwind(run) {
        Ok(code) => code,
        Err(_) => {
            show_error(&"internal error: panic");
            3
        }
    };
    // process::exit skips destructors; push out buffered stdout first.
    let _ = io::stdout().flush();
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1000").unwrap(), 1000);
        assert_eq!(parse_size("4k").unwrap(), 4000);
        assert_eq!(parse_size("4Ki").unwrap(), 4096);
        assert_eq!(parse_size("2M").unwrap(), 2_000_000);
        assert_eq!(parse_size("2Mi").unwrap(), 2 << 20);
        assert_eq!(parse_size("1G").unwrap(), 1_000_000_000);
        assert_eq!(parse_size("1Gi").unwrap(), 1 << 30);
        assert!(parse_size("").is_err());
        assert!(parse_size("x").is_err());
        assert!(parse_size("10Q").is_err()); // overflows u64
        assert!(parse_size("10k5").is_err());
        assert!(parse_size("10K").is_err()); // K needs the binary form Ki
    }

    #[test]
    fn test_output_names() {
        assert_eq!(compressed_name("data", false), "data.lz");
        assert_eq!(compressed_name("data", true), "data00001.lz");
        assert_eq!(decompressed_name("data.lz"), "data");
        assert_eq!(decompressed_name("archive.tlz"), "archive.tar");
        assert_eq!(decompressed_name("noext"), "noext.out");
    }

    #[test]
    fn test_extension_index() {
        assert_eq!(extension_index("a.lz"), Some(0));
        assert_eq!(extension_index("a.tlz"), Some(1));
        assert_eq!(extension_index("a.gz"), None);
        // The suffix alone is not a usable name.
        assert_eq!(extension_index(".lz"), None);
    }

    #[test]
    fn test_next_filename_counter() {
        let mut name = String::from("vol00001.lz");
        assert!(next_filename(&mut name));
        assert_eq!(name, "vol00002.lz");

        let mut name = String::from("vol00009.lz");
        assert!(next_filename(&mut name));
        assert_eq!(name, "vol00010.lz");

        let mut name = String::from("vol99999.lz");
        assert!(!next_filename(&mut name));
        assert_eq!(name, "vol00000.lz");
    }

    #[test]
    fn test_format_ds() {
        assert_eq!(format_ds(4096), "   4 KiB");
        assert_eq!(format_ds(1 << 23), "   8 MiB");
        assert_eq!(format_ds(3 << 19), "1536 KiB");
        assert_eq!(format_ds(1 << 29), " 512 MiB");
    }
}
