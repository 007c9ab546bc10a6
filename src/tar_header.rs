//! Parsing of a single 512-byte TAR (USTAR) header, as fetched by a
//! ranged GET during commit-time validation.
//!
//! We only ever need to read a header the client has already written, so
//! this wraps `tar::Header` (the same crate the broader ecosystem uses to
//! *build* archives, e.g. `tar::Builder` in pageserver's basebackup) for
//! field access rather than hand-rolling octal parsing.

use anyhow::Context;

pub const BLOCK_SIZE: u64 = 512;

pub struct ParsedHeader {
    pub filename: String,
    pub size: u64,
    pub is_regular: bool,
}

/// Parses a single 512-byte header block.
pub fn parse_header(block: &[u8; 512]) -> anyhow::Result<ParsedHeader> {
    let header = tar::Header::from_byte_slice(block);
    let path = header
        .path()
        .context("tar header has an unparseable path")?
        .to_string_lossy()
        .into_owned();
    let size = header.size().context("tar header has an unparseable size")?;
    let is_regular = matches!(header.entry_type(), tar::EntryType::Regular | tar::EntryType::Continuous);
    Ok(ParsedHeader {
        filename: path,
        size,
        is_regular,
    })
}

/// Rounds `size` up to the next multiple of `BLOCK_SIZE` (the padded
/// on-disk footprint of an entry's payload).
pub fn padded_size(size: u64) -> u64 {
    let rem = size % BLOCK_SIZE;
    if rem == 0 {
        size
    } else {
        size + (BLOCK_SIZE - rem)
    }
}
