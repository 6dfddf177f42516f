use std::path::Path;

use crate::hash_entry::{HashEntry, HashWidth, HASH_ENTRY_SIZE};
use crate::header::{StoreHeader, HEADER_SIZE, MAX_SUPPORTED_VERSION};
use crate::manifest::ManifestEntry;
use crate::record::RECORD_SIZE;

struct PendingModule {
    data: Vec<u8>,
    debug: Option<Vec<u8>>,
    config: Option<Vec<u8>>,
}

/// Builds a store shard from module payloads.
///
/// Layout: header, local entries, global index (index store only), then the
/// payloads of each module in order (data, debug, config).
pub struct StoreWriter {
    store_id: u32,
    version: u32,
    modules: Vec<PendingModule>,
    index32: Vec<HashEntry>,
    index64: Vec<HashEntry>,
}

impl StoreWriter {
    pub fn new(store_id: u32) -> Self {
        Self {
            store_id,
            version: MAX_SUPPORTED_VERSION,
            modules: Vec::new(),
            index32: Vec::new(),
            index64: Vec::new(),
        }
    }

    /// Override the header version (useful for producing unsupported stores).
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Queue a module and return its local index.
    pub fn add_module(&mut self, data: &[u8], debug: Option<&[u8]>, config: Option<&[u8]>) -> u32 {
        self.modules.push(PendingModule {
            data: data.to_vec(),
            debug: debug.map(<[u8]>::to_vec),
            config: config.map(<[u8]>::to_vec),
        });
        (self.modules.len() - 1) as u32
    }

    /// Add one row to both global index lists.
    pub fn add_global_entry(
        &mut self,
        hash32: u32,
        hash64: u64,
        mapping_index: u32,
        local_index: u32,
        store_id: u32,
    ) {
        let row = |width, hash| HashEntry {
            width,
            hash,
            mapping_index,
            local_index,
            store_id,
        };
        self.index32.push(row(HashWidth::Bits32, u64::from(hash32)));
        self.index64.push(row(HashWidth::Bits64, hash64));
    }

    /// Add a pair of rows whose 32-bit and 64-bit fields may disagree.
    pub fn add_global_entries(&mut self, entry32: HashEntry, entry64: HashEntry) {
        self.index32.push(HashEntry {
            width: HashWidth::Bits32,
            ..entry32
        });
        self.index64.push(HashEntry {
            width: HashWidth::Bits64,
            ..entry64
        });
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn finish_to_bytes(self) -> Vec<u8> {
        let has_index = self.store_id == 0;
        let header = StoreHeader {
            version: self.version,
            local_entry_count: self.modules.len() as u32,
            global_entry_count: self.index32.len() as u32,
            store_id: self.store_id,
        };

        let index_size = if has_index {
            (self.index32.len() + self.index64.len()) * HASH_ENTRY_SIZE
        } else {
            0
        };
        let mut cursor = (HEADER_SIZE + self.modules.len() * RECORD_SIZE + index_size) as u32;
        let mut place = |payload: Option<&Vec<u8>>| match payload {
            Some(bytes) if !bytes.is_empty() => {
                let offset = cursor;
                cursor += bytes.len() as u32;
                (offset, bytes.len() as u32)
            }
            _ => (0, 0),
        };

        let mut table = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            let data = place(Some(&module.data));
            let debug = place(module.debug.as_ref());
            let config = place(module.config.as_ref());
            table.push([data.0, data.1, debug.0, debug.1, config.0, config.1]);
        }

        let mut out = Vec::with_capacity(cursor as usize);
        out.extend_from_slice(&header.to_bytes());
        for fields in &table {
            for value in fields {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        if has_index {
            for entry in self.index32.iter().chain(&self.index64) {
                out.extend_from_slice(&entry.to_bytes());
            }
        }
        for module in &self.modules {
            out.extend_from_slice(&module.data);
            if let Some(debug) = &module.debug {
                out.extend_from_slice(debug);
            }
            if let Some(config) = &module.config {
                out.extend_from_slice(config);
            }
        }
        out
    }

    pub fn finish(self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.finish_to_bytes())
    }
}

/// Column header written as the first manifest line.
pub const MANIFEST_HEADER: &str = "Hash 32     Hash 64             Blob ID  Blob idx  Name";

/// Builds the companion text manifest for a store set.
#[derive(Default)]
pub struct ManifestWriter {
    entries: Vec<ManifestEntry>,
}

impl ManifestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hash32: u32, hash64: u64, store_id: u32, index_in_store: u32, name: &str) {
        self.entries.push(ManifestEntry {
            hash32,
            hash64,
            store_id,
            index_in_store,
            name: name.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish_to_string(&self) -> String {
        let mut out = String::from(MANIFEST_HEADER);
        out.push('\n');
        for e in &self.entries {
            out.push_str(&format!(
                "0x{:08x}  0x{:016x}  {:03}      {:04}      {}\n",
                e.hash32, e.hash64, e.store_id, e.index_in_store, e.name
            ));
        }
        out
    }

    pub fn finish(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.finish_to_string())
    }
}
