//! Binary format for sharded assembly stores.
//!
//! A store set is one or more `.blob` shards plus a text `.manifest`. Each
//! shard holds a fixed header, a table of module records and the module
//! payloads; the shard with id 0 additionally carries the global hash index
//! for the whole set.
//!
//! # Architecture
//!
//! - [`StoreHeader`]: magic, version, entry counts, store id
//! - [`ModuleRecord`]: offsets of one module's data, debug and config payloads
//! - [`HashEntry`]: one row of the global index (32-bit or 64-bit keyed)
//! - [`Store`]: a decoded shard with optional retained bytes for extraction
//! - [`Manifest`]: hash → name cross-reference
//! - [`StoreWriter`], [`ManifestWriter`]: build shards and manifests

pub mod compress;
pub mod error;
pub mod hash_entry;
pub mod header;
pub mod manifest;
pub mod reader;
pub mod record;
pub mod writer;

pub use error::{FormatError, FormatResult};
pub use hash_entry::{HashEntry, HashWidth};
pub use header::{StoreHeader, MAX_SUPPORTED_VERSION, STORE_MAGIC};
pub use manifest::{DuplicateHash, Manifest, ManifestEntry};
pub use reader::{Retention, Store};
pub use record::{ExtractOptions, ModuleRecord, Region, StoreHandle};
pub use writer::{ManifestWriter, StoreWriter};
