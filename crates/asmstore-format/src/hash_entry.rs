use std::io::{self, Read, Write};

use serde::Serialize;

use crate::error::{FormatError, FormatResult};
use crate::header::{read_u32, read_u64};

/// Encoded size of one global index record.
pub const HASH_ENTRY_SIZE: usize = 20;

/// Which of the two global index lists an entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HashWidth {
    Bits32,
    Bits64,
}

impl HashWidth {
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }
}

/// One row of the global hash index carried by the index store.
///
/// On-disk format (little-endian):
/// ```text
/// [8 bytes: hash]
/// [4 bytes: mapping index]
/// [4 bytes: local index within the target store]
/// [4 bytes: target store id]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HashEntry {
    pub width: HashWidth,
    /// Raw hash as stored. Entries of the 32-bit list only use the low half.
    pub hash: u64,
    pub mapping_index: u32,
    pub local_index: u32,
    pub store_id: u32,
}

impl HashEntry {
    pub fn decode<R: Read>(reader: &mut R, width: HashWidth) -> FormatResult<Self> {
        let section = match width {
            HashWidth::Bits32 => "32-bit global index",
            HashWidth::Bits64 => "64-bit global index",
        };
        let hash = read_u64(reader).map_err(FormatError::reading(section))?;
        let mapping_index = read_u32(reader).map_err(FormatError::reading(section))?;
        let local_index = read_u32(reader).map_err(FormatError::reading(section))?;
        let store_id = read_u32(reader).map_err(FormatError::reading(section))?;
        Ok(Self {
            width,
            hash,
            mapping_index,
            local_index,
            store_id,
        })
    }

    pub fn to_bytes(&self) -> [u8; HASH_ENTRY_SIZE] {
        let mut out = [0u8; HASH_ENTRY_SIZE];
        out[0..8].copy_from_slice(&self.hash.to_le_bytes());
        out[8..12].copy_from_slice(&self.mapping_index.to_le_bytes());
        out[12..16].copy_from_slice(&self.local_index.to_le_bytes());
        out[16..20].copy_from_slice(&self.store_id.to_le_bytes());
        out
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// The hash truncated to 32 bits.
    pub fn hash32(&self) -> u32 {
        self.hash as u32
    }
}
