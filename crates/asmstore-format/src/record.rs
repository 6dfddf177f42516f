use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::compress;
use crate::error::{FormatError, FormatResult};
use crate::header::read_u32;

/// Encoded size of one local entry.
pub const RECORD_SIZE: usize = 24;

/// Chunk size used when streaming a region out of retained store bytes.
const COPY_CHUNK_SIZE: usize = 16 * 1024;

/// One of the three payloads a module record can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Data,
    DebugData,
    ConfigData,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Data, Region::DebugData, Region::ConfigData];

    /// File extension used when the region is written to disk.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Data => "dll",
            Self::DebugData => "pdb",
            Self::ConfigData => "dll.config",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::DebugData => write!(f, "debug-data"),
            Self::ConfigData => write!(f, "config-data"),
        }
    }
}

/// Raw bytes retained from a store for later extraction.
#[derive(Clone)]
pub enum RetainedBytes {
    Buffered(Bytes),
    Mapped(Arc<Mmap>),
}

impl RetainedBytes {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Buffered(bytes) => &bytes[..],
            Self::Mapped(map) => &map[..],
        }
    }
}

impl fmt::Debug for RetainedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            Self::Mapped(m) => write!(f, "Mapped({} bytes)", m.len()),
        }
    }
}

/// Read-only handle a record keeps to the store it was decoded from.
#[derive(Debug)]
pub struct StoreHandle {
    store_id: u32,
    arch: String,
    bytes: Option<RetainedBytes>,
}

impl StoreHandle {
    pub(crate) fn new(store_id: u32, arch: String, bytes: Option<RetainedBytes>) -> Self {
        Self {
            store_id,
            arch,
            bytes,
        }
    }

    pub fn store_id(&self) -> u32 {
        self.store_id
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn has_data(&self) -> bool {
        self.bytes.is_some()
    }

    pub fn bytes(&self) -> FormatResult<&[u8]> {
        self.bytes
            .as_ref()
            .map(RetainedBytes::as_slice)
            .ok_or(FormatError::DataUnavailable)
    }
}

/// Options for [`ModuleRecord::extract_to_dir`].
#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Overrides the record's resolved name when building the file name.
    pub file_name: Option<String>,
    /// Decompress `XALZ` payloads after writing. Only applies to [`Region::Data`].
    pub decompress: bool,
}

/// One packed module: offsets into its store plus the identity assigned
/// during cross-indexing.
///
/// The identity fields (`hash32`, `hash64`, `name`, `mapping_index`) start
/// unset and can each be assigned once.
#[derive(Debug)]
pub struct ModuleRecord {
    pub data_offset: u32,
    pub data_size: u32,
    pub debug_offset: u32,
    pub debug_size: u32,
    pub config_offset: u32,
    pub config_size: u32,
    local_index: u32,
    hash32: OnceLock<u32>,
    hash64: OnceLock<u64>,
    name: OnceLock<String>,
    mapping_index: OnceLock<u32>,
    store: Arc<StoreHandle>,
}

impl ModuleRecord {
    pub(crate) fn decode<R: Read>(
        reader: &mut R,
        local_index: u32,
        store: Arc<StoreHandle>,
    ) -> FormatResult<Self> {
        let mut fields = [0u32; 6];
        for field in &mut fields {
            *field = read_u32(reader).map_err(FormatError::reading("local entries"))?;
        }
        let [data_offset, data_size, debug_offset, debug_size, config_offset, config_size] = fields;
        Ok(Self {
            data_offset,
            data_size,
            debug_offset,
            debug_size,
            config_offset,
            config_size,
            local_index,
            hash32: OnceLock::new(),
            hash64: OnceLock::new(),
            name: OnceLock::new(),
            mapping_index: OnceLock::new(),
            store,
        })
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for value in [
            self.data_offset,
            self.data_size,
            self.debug_offset,
            self.debug_size,
            self.config_offset,
            self.config_size,
        ] {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    /// Position of this record within its store.
    pub fn local_index(&self) -> u32 {
        self.local_index
    }

    pub fn store_id(&self) -> u32 {
        self.store.store_id()
    }

    pub fn arch(&self) -> &str {
        self.store.arch()
    }

    pub fn store(&self) -> &Arc<StoreHandle> {
        &self.store
    }

    /// 32-bit hash, or 0 if not yet assigned.
    pub fn hash32(&self) -> u32 {
        self.hash32.get().copied().unwrap_or(0)
    }

    /// 64-bit hash, or 0 if not yet assigned.
    pub fn hash64(&self) -> u64 {
        self.hash64.get().copied().unwrap_or(0)
    }

    /// Resolved name, or `""` if none was found.
    pub fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or("")
    }

    pub fn mapping_index(&self) -> Option<u32> {
        self.mapping_index.get().copied()
    }

    // Each setter returns `false` when the field was already assigned; the
    // stored value is never replaced.

    pub fn set_hash32(&self, hash: u32) -> bool {
        self.hash32.set(hash).is_ok()
    }

    pub fn set_hash64(&self, hash: u64) -> bool {
        self.hash64.set(hash).is_ok()
    }

    pub fn set_name(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() {
            return false;
        }
        self.name.set(name).is_ok()
    }

    pub fn set_mapping_index(&self, index: u32) -> bool {
        self.mapping_index.set(index).is_ok()
    }

    /// `(offset, size)` of a region, or `None` when an optional region is absent.
    ///
    /// The data region is always present, even when empty.
    pub fn region(&self, region: Region) -> Option<(u32, u32)> {
        let (offset, size) = match region {
            Region::Data => return Some((self.data_offset, self.data_size)),
            Region::DebugData => (self.debug_offset, self.debug_size),
            Region::ConfigData => (self.config_offset, self.config_size),
        };
        (offset != 0 && size != 0).then_some((offset, size))
    }

    /// File name for a region: `rename`, then the resolved name, then
    /// `{hash32:x}_{hash64:x}`, followed by the region's extension.
    pub fn file_name(&self, region: Region, rename: Option<&str>) -> String {
        let base = match rename.filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None if !self.name().is_empty() => self.name().to_string(),
            None => format!("{:x}_{:x}", self.hash32(), self.hash64()),
        };
        format!("{base}.{}", region.extension())
    }

    /// Borrow a region's bytes from the retained store data.
    pub fn region_bytes(&self, region: Region) -> FormatResult<&[u8]> {
        let Some((offset, size)) = self.region(region) else {
            return Ok(&[]);
        };
        let data = self.store.bytes()?;
        slice_region(data, offset, size)
    }

    /// Copy a region to `out`. Absent optional regions write nothing.
    ///
    /// Returns the number of bytes written.
    pub fn extract_to_writer<W: Write>(&self, region: Region, out: &mut W) -> FormatResult<u64> {
        if self.region(region).is_none() {
            return Ok(0);
        }
        let bytes = self.region_bytes(region)?;
        copy_chunked(bytes, out)
    }

    /// Write a region into `dir`, returning the created path.
    ///
    /// Absent optional regions produce no file and return `Ok(None)`.
    pub fn extract_to_dir(
        &self,
        dir: &Path,
        region: Region,
        options: &ExtractOptions,
    ) -> FormatResult<Option<PathBuf>> {
        if self.region(region).is_none() {
            return Ok(None);
        }
        // Resolve the bytes first so a missing retention never leaves an empty file behind.
        let bytes = self.region_bytes(region)?;

        let file_name = self.file_name(region, options.file_name.as_deref());
        if !is_plain_file_name(&file_name) {
            return Err(FormatError::UnsafeFileName(file_name));
        }
        let path = dir.join(file_name);
        let mut out = BufWriter::new(File::create(&path)?);
        copy_chunked(bytes, &mut out)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        if options.decompress && region == Region::Data {
            compress::decompress_file_in_place(&path)?;
        }
        Ok(Some(path))
    }
}

/// Names come from manifests and must not escape the output directory.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

fn slice_region(data: &[u8], offset: u32, size: u32) -> FormatResult<&[u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .filter(|&end| end <= data.len())
        .ok_or(FormatError::RegionOutOfBounds {
            offset,
            size,
            len: data.len(),
        })?;
    Ok(&data[start..end])
}

fn copy_chunked<W: Write>(bytes: &[u8], out: &mut W) -> FormatResult<u64> {
    for chunk in bytes.chunks(COPY_CHUNK_SIZE) {
        out.write_all(chunk)?;
    }
    out.flush()?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(fields: [u32; 6], bytes: Option<Vec<u8>>) -> ModuleRecord {
        let mut raw = Vec::new();
        for f in fields {
            raw.extend_from_slice(&f.to_le_bytes());
        }
        let handle = Arc::new(StoreHandle::new(
            1,
            "arm64".into(),
            bytes.map(|b| RetainedBytes::Buffered(Bytes::from(b))),
        ));
        ModuleRecord::decode(&mut raw.as_slice(), 0, handle).unwrap()
    }

    #[test]
    fn decode_encode_preserves_layout() {
        let rec = record_with([10, 20, 30, 40, 50, 60], None);
        assert_eq!(rec.data_offset, 10);
        assert_eq!(rec.config_size, 60);
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        assert_eq!(out.len(), RECORD_SIZE);
        assert_eq!(&out[..4], &10u32.to_le_bytes());
    }

    #[test]
    fn identity_fields_are_write_once() {
        let rec = record_with([0; 6], None);
        assert_eq!(rec.hash32(), 0);
        assert_eq!(rec.name(), "");
        assert!(rec.mapping_index().is_none());

        assert!(rec.set_hash32(0xAA));
        assert!(!rec.set_hash32(0xBB));
        assert_eq!(rec.hash32(), 0xAA);

        assert!(!rec.set_name(""));
        assert!(rec.set_name("Foo"));
        assert!(!rec.set_name("Bar"));
        assert_eq!(rec.name(), "Foo");
    }

    #[test]
    fn optional_regions_absent_on_zero() {
        let rec = record_with([4, 2, 0, 5, 9, 0], None);
        assert_eq!(rec.region(Region::Data), Some((4, 2)));
        assert_eq!(rec.region(Region::DebugData), None);
        assert_eq!(rec.region(Region::ConfigData), None);
    }

    #[test]
    fn file_name_fallbacks() {
        let rec = record_with([0; 6], None);
        rec.set_hash32(0xab);
        rec.set_hash64(0xcd);
        assert_eq!(rec.file_name(Region::Data, None), "ab_cd.dll");
        assert_eq!(rec.file_name(Region::DebugData, Some("Renamed")), "Renamed.pdb");

        rec.set_name("Foo");
        assert_eq!(rec.file_name(Region::ConfigData, None), "Foo.dll.config");
        assert_eq!(rec.file_name(Region::Data, Some("")), "Foo.dll");
    }

    #[test]
    fn extract_requires_retained_bytes() {
        let rec = record_with([0, 4, 0, 0, 0, 0], None);
        let mut out = Vec::new();
        let err = rec.extract_to_writer(Region::Data, &mut out).unwrap_err();
        assert!(matches!(err, FormatError::DataUnavailable));
    }

    #[test]
    fn absent_region_is_noop_without_bytes() {
        let rec = record_with([0, 4, 0, 0, 0, 0], None);
        let mut out = Vec::new();
        assert_eq!(rec.extract_to_writer(Region::DebugData, &mut out).unwrap(), 0);
        assert!(out.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let created = rec
            .extract_to_dir(dir.path(), Region::ConfigData, &ExtractOptions::default())
            .unwrap();
        assert!(created.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn extract_copies_exact_region() {
        let mut bytes = vec![0u8; 8];
        bytes.extend(std::iter::repeat(0x5A).take(40_000));
        bytes.extend_from_slice(b"tail");
        let rec = record_with([8, 40_000, 0, 0, 0, 0], Some(bytes));

        let mut out = Vec::new();
        let written = rec.extract_to_writer(Region::Data, &mut out).unwrap();
        assert_eq!(written, 40_000);
        assert!(out.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn region_past_end_fails() {
        let rec = record_with([4, 100, 0, 0, 0, 0], Some(vec![0u8; 16]));
        let err = rec.region_bytes(Region::Data).unwrap_err();
        assert!(matches!(err, FormatError::RegionOutOfBounds { len: 16, .. }));
    }

    #[test]
    fn extract_to_dir_decompresses_data() {
        let image = b"decompressed module image".repeat(40);
        let packed = compress::compress_for_test(&image);
        let mut bytes = vec![0u8; 4];
        bytes.extend_from_slice(&packed);
        let rec = record_with([4, packed.len() as u32, 0, 0, 0, 0], Some(bytes));
        rec.set_name("Foo");

        let dir = tempfile::tempdir().unwrap();
        let options = ExtractOptions {
            file_name: None,
            decompress: true,
        };
        let path = rec
            .extract_to_dir(dir.path(), Region::Data, &options)
            .unwrap()
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "Foo.dll");
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len() as u32, compress::uncompressed_len(&packed).unwrap());
        assert_eq!(written, image);
    }

    #[test]
    fn extract_to_dir_rejects_escaping_names() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        std::fs::create_dir(&out).unwrap();

        for name in ["../escaped", "/tmp/absolute", "nested/name", "..\\win"] {
            let rec = record_with([0, 4, 0, 0, 0, 0], Some(b"data".to_vec()));
            rec.set_name(name);
            let err = rec
                .extract_to_dir(&out, Region::Data, &ExtractOptions::default())
                .unwrap_err();
            assert!(matches!(err, FormatError::UnsafeFileName(_)), "{name}");
        }
        assert!(!root.path().join("escaped.dll").exists());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);

        let rec = record_with([0, 4, 0, 0, 0, 0], Some(b"data".to_vec()));
        let options = ExtractOptions {
            file_name: Some("../renamed".into()),
            decompress: false,
        };
        assert!(rec.extract_to_dir(&out, Region::Data, &options).is_err());
    }

    #[test]
    fn dotted_names_are_plain() {
        assert!(is_plain_file_name("System.Runtime.dll"));
        assert!(is_plain_file_name("Foo.dll.config"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("a/b.dll"));
    }
}
