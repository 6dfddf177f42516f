//! The store-set explorer: loads every member of a set, resolves module
//! identities through the global index and manifest, and validates stores
//! that share an id across architectures.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use asmstore_format::{HashEntry, Manifest, ModuleRecord, Store};
use zip::ZipArchive;

use crate::config::ExplorerConfig;
use crate::diagnostics::{Diagnostics, LogSink, TracingSink};
use crate::discovery::{self, SetMember};
use crate::error::{ExplorerError, ExplorerResult};
use crate::naming::{self, ArchiveKind};

/// Placeholder path for sets read from a caller-supplied archive.
pub const IN_MEMORY_ARCHIVE: &str = "<in-memory-archive>";

/// A fully loaded and cross-indexed store set.
///
/// Built once; afterwards every accessor takes `&self` and the explorer can
/// be shared between threads.
pub struct StoreSetExplorer {
    store_path: String,
    set_name: String,
    config: ExplorerConfig,
    stores: BTreeMap<u32, Vec<Arc<Store>>>,
    index_store: Option<Arc<Store>>,
    manifest: Option<Manifest>,
    modules: Vec<Arc<ModuleRecord>>,
    by_name: HashMap<String, Arc<ModuleRecord>>,
    by_hash32: HashMap<u32, Arc<ModuleRecord>>,
    by_hash64: HashMap<u64, Arc<ModuleRecord>>,
    stores_read: usize,
    diagnostics: Diagnostics,
}

impl fmt::Debug for StoreSetExplorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSetExplorer")
            .field("store_path", &self.store_path)
            .field("set_name", &self.set_name)
            .field("stores_read", &self.stores_read)
            .field("modules", &self.modules.len())
            .field("complete", &self.is_complete())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl StoreSetExplorer {
    /// Open the set that `path` belongs to, logging through `tracing`.
    pub fn open(path: impl AsRef<Path>, config: ExplorerConfig) -> ExplorerResult<Self> {
        Self::open_with_sink(path, config, Arc::new(TracingSink))
    }

    /// Open the set that `path` belongs to.
    ///
    /// `path` may be any store or manifest of the set, an extension-less set
    /// name, or an `.apk`/`.aab`/`.zip` archive containing the set.
    pub fn open_with_sink(
        path: impl AsRef<Path>,
        config: ExplorerConfig,
        sink: Arc<dyn LogSink>,
    ) -> ExplorerResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ExplorerError::EmptyPath);
        }
        if path.is_dir() {
            return Err(ExplorerError::IsDirectory(path.to_path_buf()));
        }
        let display = path.display().to_string();
        let set_name =
            naming::base_name(path).ok_or_else(|| ExplorerError::NoBaseName(display.clone()))?;

        let mut explorer = Self::empty(display.clone(), set_name.clone(), config, sink);
        let retention = explorer.config.retention;

        let members = match ArchiveKind::from_path(path) {
            None => {
                explorer
                    .diagnostics
                    .info(format!("{display} is not an archive, reading from filesystem"));
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                discovery::scan_directory(dir, &set_name, retention)?
            }
            Some(kind) => {
                explorer
                    .diagnostics
                    .info(format!("{display} is an {kind} archive"));
                discovery::scan_archive_file(path, &kind.entry_prefix(&set_name), retention)?
            }
        };

        explorer.load(members);
        explorer.process();
        Ok(explorer)
    }

    /// Read a set from an already-open archive.
    ///
    /// `base_path_in_archive` is the entry-name prefix shared by the set's
    /// members, e.g. `assemblies/assemblies.`.
    pub fn from_archive<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        base_path_in_archive: &str,
        config: ExplorerConfig,
        sink: Arc<dyn LogSink>,
    ) -> ExplorerResult<Self> {
        let mut explorer = Self::empty(
            IN_MEMORY_ARCHIVE.to_string(),
            IN_MEMORY_ARCHIVE.to_string(),
            config,
            sink,
        );
        let members =
            discovery::scan_archive(archive, base_path_in_archive, explorer.config.retention)?;
        explorer.load(members);
        explorer.process();
        Ok(explorer)
    }

    fn empty(
        store_path: String,
        set_name: String,
        config: ExplorerConfig,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            store_path,
            set_name,
            config,
            stores: BTreeMap::new(),
            index_store: None,
            manifest: None,
            modules: Vec::new(),
            by_name: HashMap::new(),
            by_hash32: HashMap::new(),
            by_hash64: HashMap::new(),
            stores_read: 0,
            diagnostics: Diagnostics::new(sink),
        }
    }

    // ---------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------

    fn load(&mut self, members: Vec<SetMember>) {
        for member in members {
            match member {
                SetMember::Store { source, store } => self.add_store(&source, store),
                SetMember::Manifest { source, manifest } => {
                    if self.manifest.is_some() {
                        self.diagnostics
                            .warn(format!("ignoring additional manifest {source}"));
                        continue;
                    }
                    self.diagnostics.debug(format!(
                        "read manifest {source} ({} entries)",
                        manifest.len()
                    ));
                    for dup in manifest.duplicates() {
                        self.diagnostics.warn(format!(
                            "manifest {source} lists {}-bit hash {:#x} for both '{}' and '{}'; keeping '{}'",
                            dup.width.bits(),
                            dup.hash,
                            dup.kept,
                            dup.ignored,
                            dup.kept
                        ));
                    }
                    self.manifest = Some(manifest);
                }
            }
        }
    }

    fn add_store(&mut self, source: &str, store: Store) {
        self.stores_read += 1;
        self.diagnostics.debug(format!(
            "read store {source}: id {}, arch '{}', {} modules",
            store.store_id(),
            store.arch(),
            store.records().len()
        ));

        let store = Arc::new(store);
        if store.has_global_index() {
            match &self.index_store {
                None => self.index_store = Some(Arc::clone(&store)),
                Some(first) => self.diagnostics.error(format!(
                    "store {source} is a second index store; keeping the one for architecture '{}'",
                    first.arch()
                )),
            }
        }

        self.modules.extend(store.records().iter().cloned());
        self.stores.entry(store.store_id()).or_default().push(store);
    }

    // ---------------------------------------------------------------
    // Cross-indexing
    // ---------------------------------------------------------------

    fn process(&mut self) {
        if self.stores.is_empty() {
            self.diagnostics
                .warn(format!("no stores found for set '{}'", self.set_name));
            return;
        }
        if self.manifest.is_none() {
            self.diagnostics
                .warn(format!("no manifest found for set '{}'", self.set_name));
        }

        match self.index_store.clone() {
            Some(index) => {
                self.apply_index32(index.index32());
                self.apply_index64(index.index64());
            }
            None => self.diagnostics.warn(format!(
                "set '{}' has no index store; module names and hashes stay unresolved",
                self.set_name
            )),
        }

        if self.config.validate_architectures {
            self.validate_architectures();
        }
    }

    /// Records addressed by a global index entry, one per store sharing the
    /// target id.
    fn targets(&mut self, entry: &HashEntry) -> Vec<Arc<ModuleRecord>> {
        let Some(group) = self.stores.get(&entry.store_id) else {
            self.diagnostics.warn(format!(
                "store with id {} is not part of the set",
                entry.store_id
            ));
            return Vec::new();
        };

        let mut records = Vec::with_capacity(group.len());
        for store in group {
            match store.record(entry.local_index) {
                Some(record) => records.push(Arc::clone(record)),
                None => self.diagnostics.warn(format!(
                    "{}-bit index entry with hash {:#x} has invalid store {} ('{}') index {} ({} modules)",
                    entry.width.bits(),
                    entry.hash,
                    store.store_id(),
                    store.arch(),
                    entry.local_index,
                    store.records().len()
                )),
            }
        }
        records
    }

    fn apply_index32(&mut self, index: &[HashEntry]) {
        for entry in index {
            for record in self.targets(entry) {
                if !record.set_hash32(entry.hash32()) && record.hash32() != entry.hash32() {
                    self.diagnostics.warn(format!(
                        "module {} of store {} ('{}') already has 32-bit hash {:#x}; ignoring {:#x}",
                        record.local_index(),
                        record.store_id(),
                        record.arch(),
                        record.hash32(),
                        entry.hash32()
                    ));
                }
                record.set_mapping_index(entry.mapping_index);

                let name = self
                    .manifest
                    .as_ref()
                    .and_then(|m| m.by_hash32(record.hash32()))
                    .map(|me| me.name.clone());
                if let Some(name) = name {
                    record.set_name(name);
                }

                self.register_name(&record);
                if record.hash32() != 0 {
                    self.by_hash32
                        .entry(record.hash32())
                        .or_insert_with(|| Arc::clone(&record));
                }
            }
        }
    }

    fn apply_index64(&mut self, index: &[HashEntry]) {
        for entry in index {
            for record in self.targets(entry) {
                if !record.set_hash64(entry.hash) && record.hash64() != entry.hash {
                    self.diagnostics.warn(format!(
                        "module {} of store {} ('{}') already has 64-bit hash {:#x}; ignoring {:#x}",
                        record.local_index(),
                        record.store_id(),
                        record.arch(),
                        record.hash64(),
                        entry.hash
                    ));
                }

                match record.mapping_index() {
                    Some(existing) if existing != entry.mapping_index => {
                        self.diagnostics.warn(format!(
                            "module with hashes {:#x} and {:#x} has 32-bit mapping index {existing} but 64-bit mapping index {}",
                            record.hash32(),
                            record.hash64(),
                            entry.mapping_index
                        ));
                    }
                    Some(_) => {}
                    None => {
                        record.set_mapping_index(entry.mapping_index);
                    }
                }

                let from_manifest = self
                    .manifest
                    .as_ref()
                    .and_then(|m| m.by_hash64(record.hash64()))
                    .map(|me| me.name.clone());

                if record.name().is_empty() {
                    if let Some(name) = from_manifest {
                        self.diagnostics.warn(format!(
                            "32-bit hash {:#x} did not match any module name in the manifest, using '{name}' from 64-bit hash {:#x}",
                            record.hash32(),
                            record.hash64()
                        ));
                        record.set_name(name);
                    }
                    if record.name().is_empty() && self.manifest.is_some() {
                        self.diagnostics.warn(format!(
                            "64-bit hash {:#x} did not match any module name in the manifest",
                            record.hash64()
                        ));
                    }
                } else if let Some(name) = from_manifest.filter(|n| n != record.name()) {
                    self.diagnostics.warn(format!(
                        "32-bit hash {:#x} maps to module name '{}', however 64-bit hash {:#x} for the same module maps to a different name '{name}'",
                        record.hash32(),
                        record.name(),
                        record.hash64()
                    ));
                }

                self.register_name(&record);
                if record.hash64() != 0 {
                    self.by_hash64
                        .entry(record.hash64())
                        .or_insert_with(|| Arc::clone(&record));
                }
            }
        }
    }

    fn register_name(&mut self, record: &Arc<ModuleRecord>) {
        if record.name().is_empty() {
            return;
        }
        self.by_name
            .entry(record.name().to_ascii_lowercase())
            .or_insert_with(|| Arc::clone(record));
    }

    fn validate_architectures(&mut self) {
        for (id, group) in &self.stores {
            let Some((template, others)) = group.split_first() else {
                continue;
            };
            for other in others {
                if !template.has_equivalent_content(other) {
                    self.diagnostics.error(format!(
                        "store id {id} for architecture '{}' is not identical to other stores with the same id",
                        other.arch()
                    ));
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    /// The path the set was opened from.
    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// The set's base name.
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Stores grouped by id; each group holds one store per architecture.
    pub fn stores(&self) -> &BTreeMap<u32, Vec<Arc<Store>>> {
        &self.stores
    }

    pub fn index_store(&self) -> Option<&Arc<Store>> {
        self.index_store.as_ref()
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Every module record of every store, in load order.
    pub fn modules(&self) -> &[Arc<ModuleRecord>] {
        &self.modules
    }

    /// Look up a module by name, ignoring ASCII case.
    pub fn by_name(&self, name: &str) -> Option<&Arc<ModuleRecord>> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    pub fn by_hash32(&self, hash: u32) -> Option<&Arc<ModuleRecord>> {
        self.by_hash32.get(&hash)
    }

    pub fn by_hash64(&self, hash: u64) -> Option<&Arc<ModuleRecord>> {
        self.by_hash64.get(&hash)
    }

    /// Name map, keyed by lower-cased name.
    pub fn modules_by_name(&self) -> &HashMap<String, Arc<ModuleRecord>> {
        &self.by_name
    }

    pub fn modules_by_hash32(&self) -> &HashMap<u32, Arc<ModuleRecord>> {
        &self.by_hash32
    }

    pub fn modules_by_hash64(&self) -> &HashMap<u64, Arc<ModuleRecord>> {
        &self.by_hash64
    }

    /// Resolve a module by name, or by a hex hash (`0x` optional) tried as
    /// 64-bit then 32-bit.
    pub fn resolve(&self, query: &str) -> Option<&Arc<ModuleRecord>> {
        if let Some(record) = self.by_name(query) {
            return Some(record);
        }
        let hex = query.strip_prefix("0x").unwrap_or(query);
        let hash = u64::from_str_radix(hex, 16).ok()?;
        self.by_hash64(hash).or_else(|| {
            u32::try_from(hash)
                .ok()
                .and_then(|h32| self.by_hash32(h32))
        })
    }

    /// Exactly one index store and a manifest were found.
    pub fn is_complete(&self) -> bool {
        self.index_store.is_some()
            && self.manifest.is_some()
            && self.stores.get(&0).map_or(0, Vec::len) == 1
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.warning_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.warning_count()
    }

    /// Number of store shards decoded.
    pub fn stores_read(&self) -> usize {
        self.stores_read
    }
}
