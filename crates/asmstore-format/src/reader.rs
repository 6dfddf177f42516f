use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, FormatResult};
use crate::hash_entry::{HashEntry, HashWidth};
use crate::header::StoreHeader;
use crate::record::{ModuleRecord, Region, RetainedBytes, StoreHandle};

/// What a [`Store`] keeps of its source bytes after decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    /// Keep nothing; region extraction fails with `DataUnavailable`.
    #[default]
    Discard,
    /// Buffer the whole store in memory.
    InMemory,
    /// Memory-map the store file. Sources that are not files are buffered instead.
    Mapped,
}

impl Retention {
    pub fn retains_data(self) -> bool {
        !matches!(self, Self::Discard)
    }
}

/// A single decoded store shard.
#[derive(Debug)]
pub struct Store {
    header: StoreHeader,
    arch: String,
    records: Vec<Arc<ModuleRecord>>,
    index32: Vec<HashEntry>,
    index64: Vec<HashEntry>,
    handle: Arc<StoreHandle>,
}

impl Store {
    /// Decode a store from a one-shot byte source.
    ///
    /// With [`Retention::Discard`] only the header, local entries and global
    /// index are consumed. Any other retention buffers the full source first.
    pub fn from_reader<R: Read>(
        mut source: R,
        arch: Option<&str>,
        retention: Retention,
    ) -> FormatResult<Self> {
        if retention.retains_data() {
            let mut buf = Vec::new();
            source.read_to_end(&mut buf)?;
            return Self::from_bytes(buf, arch, retention);
        }
        Self::decode(&mut BufReader::new(source), arch, None)
    }

    /// Decode a store from bytes already in memory.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        arch: Option<&str>,
        retention: Retention,
    ) -> FormatResult<Self> {
        let bytes: Bytes = bytes.into();
        let retained = retention
            .retains_data()
            .then(|| RetainedBytes::Buffered(bytes.clone()));
        Self::decode(&mut &bytes[..], arch, retained)
    }

    /// Open a store file, memory-mapping it for [`Retention::Mapped`].
    pub fn open(path: &Path, arch: Option<&str>, retention: Retention) -> FormatResult<Self> {
        let file = File::open(path)?;
        match retention {
            Retention::Mapped => {
                // SAFETY: the mapping is read-only and store files are not
                // expected to be modified while a store set is open.
                let map = unsafe { Mmap::map(&file)? };
                let map = Arc::new(map);
                let store = Self::decode(
                    &mut &map[..],
                    arch,
                    Some(RetainedBytes::Mapped(Arc::clone(&map))),
                )?;
                tracing::debug!(path = %path.display(), bytes = map.len(), "mapped store");
                Ok(store)
            }
            _ => Self::from_reader(file, arch, retention),
        }
    }

    fn decode<R: Read>(
        reader: &mut R,
        arch: Option<&str>,
        retained: Option<RetainedBytes>,
    ) -> FormatResult<Self> {
        let header = StoreHeader::decode(reader)?;
        let arch = arch.unwrap_or_default().to_string();
        let handle = Arc::new(StoreHandle::new(header.store_id, arch.clone(), retained));

        let mut records = Vec::with_capacity(header.local_entry_count.min(4096) as usize);
        for local_index in 0..header.local_entry_count {
            let record = ModuleRecord::decode(reader, local_index, Arc::clone(&handle))?;
            records.push(Arc::new(record));
        }

        let mut index32 = Vec::new();
        let mut index64 = Vec::new();
        if header.has_global_index() {
            for (list, width) in [
                (&mut index32, HashWidth::Bits32),
                (&mut index64, HashWidth::Bits64),
            ] {
                list.reserve(header.global_entry_count.min(4096) as usize);
                for _ in 0..header.global_entry_count {
                    list.push(HashEntry::decode(reader, width)?);
                }
            }
        }

        tracing::debug!(
            store_id = header.store_id,
            arch = %arch,
            records = records.len(),
            global_entries = index32.len(),
            "decoded store"
        );

        Ok(Self {
            header,
            arch,
            records,
            index32,
            index64,
            handle,
        })
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn local_entry_count(&self) -> u32 {
        self.header.local_entry_count
    }

    pub fn global_entry_count(&self) -> u32 {
        self.header.global_entry_count
    }

    pub fn store_id(&self) -> u32 {
        self.header.store_id
    }

    /// Architecture tag derived from the store's path, empty when unknown.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn has_global_index(&self) -> bool {
        self.header.has_global_index()
    }

    /// Whether region extraction is possible.
    pub fn has_data(&self) -> bool {
        self.handle.has_data()
    }

    /// Module records in file order; position equals local index.
    pub fn records(&self) -> &[Arc<ModuleRecord>] {
        &self.records
    }

    pub fn record(&self, local_index: u32) -> Option<&Arc<ModuleRecord>> {
        self.records.get(local_index as usize)
    }

    /// The 32-bit keyed global index. Empty unless this is the index store.
    pub fn index32(&self) -> &[HashEntry] {
        &self.index32
    }

    /// The 64-bit keyed global index. Empty unless this is the index store.
    pub fn index64(&self) -> &[HashEntry] {
        &self.index64
    }

    /// Copy one of `record`'s regions out of this store's retained bytes.
    pub fn extract<W: Write>(
        &self,
        record: &ModuleRecord,
        region: Region,
        out: &mut W,
    ) -> FormatResult<u64> {
        if !Arc::ptr_eq(record.store(), &self.handle) {
            return Err(FormatError::ForeignRecord {
                store_id: self.store_id(),
                record_store_id: record.store_id(),
            });
        }
        record.extract_to_writer(region, out)
    }

    /// Structural comparison used to detect divergence between stores that
    /// share an id across architectures. Does not compare payload bytes.
    pub fn has_equivalent_content(&self, other: &Store) -> bool {
        self.header.version == other.header.version
            && self.header.local_entry_count == other.header.local_entry_count
            && self.header.global_entry_count == other.header.global_entry_count
            && self.header.store_id == other.header.store_id
            && self.records.len() == other.records.len()
            && self.index32.len() == other.index32.len()
            && self.index64.len() == other.index64.len()
    }

    /// Re-encode the header, local entries and global index.
    pub fn encode_layout<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.header.encode(writer)?;
        for record in &self.records {
            record.encode(writer)?;
        }
        for entry in self.index32.iter().chain(&self.index64) {
            entry.encode(writer)?;
        }
        Ok(())
    }
}
