//! Explorer for sharded assembly store sets.
//!
//! Given any member of a set (a shard, its manifest, or an archive that
//! carries the set), loads every shard, resolves module names and hashes
//! through the global index and manifest, and checks that shards sharing an
//! id agree across architectures.
//!
//! # Key Types
//!
//! - [`StoreSetExplorer`] -- The loaded, cross-indexed set
//! - [`ExplorerConfig`] -- Retention and validation settings (TOML)
//! - [`LogSink`] -- Receiver for non-fatal diagnostics
//! - [`ArchiveKind`] -- Container archives that can carry a set

pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod explorer;
pub mod naming;

pub use config::ExplorerConfig;
pub use diagnostics::{LogLevel, LogSink, MemorySink, TracingSink};
pub use error::{ExplorerError, ExplorerResult};
pub use explorer::StoreSetExplorer;
pub use naming::{base_name, store_arch, ArchiveKind};

pub use asmstore_format::{ExtractOptions, ModuleRecord, Region, Retention, Store};
