use std::io::{self, Read, Write};

use crate::error::{FormatError, FormatResult};

/// Store magic, `XABA` read as a little-endian u32.
pub const STORE_MAGIC: u32 = 0x4142_4158;

/// Highest store format version this reader understands.
pub const MAX_SUPPORTED_VERSION: u32 = 1;

/// Encoded header size in bytes.
pub const HEADER_SIZE: usize = 20;

/// Fixed header at the start of every store shard.
///
/// On-disk format (all little-endian):
/// ```text
/// [4 bytes: magic]
/// [4 bytes: format version]
/// [4 bytes: local entry count]
/// [4 bytes: global entry count]
/// [4 bytes: store id]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreHeader {
    pub version: u32,
    pub local_entry_count: u32,
    pub global_entry_count: u32,
    pub store_id: u32,
}

impl StoreHeader {
    /// Decode and validate a header. Magic and version failures are fatal.
    pub fn decode<R: Read>(reader: &mut R) -> FormatResult<Self> {
        let magic = read_u32(reader).map_err(FormatError::reading("header"))?;
        if magic != STORE_MAGIC {
            return Err(FormatError::InvalidMagic {
                expected: STORE_MAGIC,
                actual: magic,
            });
        }

        let version = read_u32(reader).map_err(FormatError::reading("header"))?;
        if version == 0 {
            return Err(FormatError::ZeroVersion);
        }
        if version > MAX_SUPPORTED_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                max: MAX_SUPPORTED_VERSION,
            });
        }

        let local_entry_count = read_u32(reader).map_err(FormatError::reading("header"))?;
        let global_entry_count = read_u32(reader).map_err(FormatError::reading("header"))?;
        let store_id = read_u32(reader).map_err(FormatError::reading("header"))?;

        Ok(Self {
            version,
            local_entry_count,
            global_entry_count,
            store_id,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let fields = [
            STORE_MAGIC,
            self.version,
            self.local_entry_count,
            self.global_entry_count,
            self.store_id,
        ];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Only the index store (id 0) carries the global hash index.
    pub fn has_global_index(&self) -> bool {
        self.store_id == 0
    }
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
