//! The TAR index format: a sequence of fixed 16-byte
//! records, one per regular TAR entry, in archive order --
//! `start_offset: u64 LE` followed by `size: u64 LE`.

use anyhow::{bail, ensure};

pub const RECORD_SIZE: usize = 16;
pub const TAR_TRAILER_SIZE: u64 = 1024; // two 512-byte zero blocks
pub const HEADER_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub start_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TarIndex {
    entries: Vec<IndexEntry>,
}

impl TarIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Parses a raw index object's bytes. Fails if the length is not a
    /// multiple of `RECORD_SIZE`.
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        ensure!(
            bytes.len() % RECORD_SIZE == 0,
            "index length {} is not a multiple of {RECORD_SIZE}",
            bytes.len()
        );
        let entries = bytes
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let start_offset = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
                let size = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
                IndexEntry { start_offset, size }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * RECORD_SIZE);
        for entry in &self.entries {
            out.extend_from_slice(&entry.start_offset.to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<IndexEntry> {
        self.entries.get(index).copied()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The on-disk archive length implied by the last entry: its header,
    /// padded payload, and the two-block trailer.
    pub fn archive_length(&self) -> anyhow::Result<u64> {
        let Some(last) = self.entries.last() else {
            bail!("cannot compute archive length of an empty index");
        };
        let padded = crate::tar_header::padded_size(last.size);
        Ok(last.start_offset + HEADER_SIZE + padded + TAR_TRAILER_SIZE)
    }

    /// Half-open-to-inclusive byte range covering entries `[k0, k1]`
    /// (inclusive), as used by the download planner.
    pub fn byte_range(&self, k0: usize, k1: usize) -> anyhow::Result<(u64, u64)> {
        let first = self.get(k0).ok_or_else(|| anyhow::anyhow!("index entry {k0} out of range"))?;
        let last = self.get(k1).ok_or_else(|| anyhow::anyhow!("index entry {k1} out of range"))?;
        let end = last.start_offset + HEADER_SIZE + crate::tar_header::padded_size(last.size) - 1;
        Ok((first.start_offset, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TarIndex {
        TarIndex::new(vec![
            IndexEntry {
                start_offset: 0,
                size: 18,
            },
            IndexEntry {
                start_offset: 1024,
                size: 18,
            },
        ])
    }

    #[test]
    fn round_trips_through_bytes() {
        let idx = sample();
        let bytes = idx.to_bytes();
        assert_eq!(bytes.len(), 32);
        let parsed = TarIndex::parse(&bytes).unwrap();
        assert_eq!(parsed.entries(), idx.entries());
    }

    #[test]
    fn rejects_misaligned_length() {
        let err = TarIndex::parse(&[0u8; 17]).unwrap_err();
        assert!(err.to_string().contains("multiple of"));
    }

    #[test]
    fn archive_length_accounts_for_padding_and_trailer() {
        let idx = sample();
        // last entry: offset 1024, header 512, payload padded to 512, trailer 1024
        assert_eq!(idx.archive_length().unwrap(), 1024 + 512 + 512 + 1024);
    }

    #[test]
    fn byte_range_covers_header_through_padded_payload() {
        let idx = sample();
        let (start, end) = idx.byte_range(0, 0).unwrap();
        assert_eq!(start, 0);
        assert_eq!(end, 512 + 512 - 1);
    }
}
