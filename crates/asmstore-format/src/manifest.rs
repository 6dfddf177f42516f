//! Companion text manifest mapping module hashes to names.
//!
//! The first line is a column header and is ignored. Every following
//! non-empty line holds five whitespace-separated fields:
//! `hash32 hash64 store_id index_in_store name`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use serde::Serialize;

use crate::error::{FormatError, FormatResult};
use crate::hash_entry::HashWidth;

const FIELD_COUNT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub hash32: u32,
    pub hash64: u64,
    pub store_id: u32,
    pub index_in_store: u32,
    pub name: String,
}

impl ManifestEntry {
    /// Parse one manifest line. `line` is 1-based and only used in errors.
    pub fn parse(text: &str, line: usize) -> FormatResult<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(FormatError::ManifestFieldCount {
                line,
                found: fields.len(),
            });
        }

        let invalid = |field: &'static str, value: &str| FormatError::ManifestValue {
            line,
            field,
            value: value.to_string(),
        };

        let hash32 = u32::from_str_radix(strip_hex_prefix(fields[0]), 16)
            .map_err(|_| invalid("hash32", fields[0]))?;
        let hash64 = u64::from_str_radix(strip_hex_prefix(fields[1]), 16)
            .map_err(|_| invalid("hash64", fields[1]))?;
        let store_id = parse_number(fields[2]).ok_or_else(|| invalid("store id", fields[2]))?;
        let index_in_store =
            parse_number(fields[3]).ok_or_else(|| invalid("store index", fields[3]))?;

        Ok(Self {
            hash32,
            hash64,
            store_id,
            index_in_store,
            name: fields[4].trim().to_string(),
        })
    }
}

fn strip_hex_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Decimal, or hexadecimal when prefixed with `0x`.
fn parse_number(value: &str) -> Option<u32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// A hash claimed by more than one manifest line. The first line wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateHash {
    pub width: HashWidth,
    pub hash: u64,
    pub kept: String,
    pub ignored: String,
}

/// Parsed manifest with hash lookups. Zero hashes are never indexed.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    by_hash32: HashMap<u32, usize>,
    by_hash64: HashMap<u64, usize>,
    duplicates: Vec<DuplicateHash>,
}

impl Manifest {
    /// Parse a manifest. A malformed line aborts parsing.
    pub fn from_reader<R: Read>(source: R) -> FormatResult<Self> {
        let mut manifest = Self::default();
        let mut lines = BufReader::new(source).lines();

        // Column header.
        if let Some(header) = lines.next() {
            header?;
        }

        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            manifest.insert(ManifestEntry::parse(&line, i + 2)?);
        }

        tracing::debug!(entries = manifest.entries.len(), "parsed manifest");
        Ok(manifest)
    }

    pub fn parse(text: &str) -> FormatResult<Self> {
        Self::from_reader(text.as_bytes())
    }

    fn insert(&mut self, entry: ManifestEntry) {
        let slot = self.entries.len();
        if entry.hash32 != 0 {
            match self.by_hash32.get(&entry.hash32) {
                Some(&first) => {
                    self.record_duplicate(HashWidth::Bits32, entry.hash32.into(), first, &entry)
                }
                None => {
                    self.by_hash32.insert(entry.hash32, slot);
                }
            }
        }
        if entry.hash64 != 0 {
            match self.by_hash64.get(&entry.hash64) {
                Some(&first) => {
                    self.record_duplicate(HashWidth::Bits64, entry.hash64, first, &entry)
                }
                None => {
                    self.by_hash64.insert(entry.hash64, slot);
                }
            }
        }
        self.entries.push(entry);
    }

    fn record_duplicate(
        &mut self,
        width: HashWidth,
        hash: u64,
        first: usize,
        entry: &ManifestEntry,
    ) {
        let kept = self.entries[first].name.clone();
        tracing::debug!(
            bits = width.bits(),
            hash = format_args!("{hash:#x}"),
            kept = %kept,
            ignored = %entry.name,
            "duplicate hash in manifest"
        );
        self.duplicates.push(DuplicateHash {
            width,
            hash,
            kept,
            ignored: entry.name.clone(),
        });
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Hashes that appeared on more than one line, in file order.
    pub fn duplicates(&self) -> &[DuplicateHash] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_hash32(&self, hash: u32) -> Option<&ManifestEntry> {
        if hash == 0 {
            return None;
        }
        self.by_hash32.get(&hash).map(|&i| &self.entries[i])
    }

    pub fn by_hash64(&self, hash: u64) -> Option<&ManifestEntry> {
        if hash == 0 {
            return None;
        }
        self.by_hash64.get(&hash).map(|&i| &self.entries[i])
    }
}
