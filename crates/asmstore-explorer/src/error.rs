//! Error types for the explorer crate.

use std::path::PathBuf;

use asmstore_format::FormatError;

/// Errors that abort store-set construction.
///
/// Referential and consistency problems are not errors here; they are
/// reported through the explorer's log sink instead.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    /// The store path was empty.
    #[error("store path must not be empty")]
    EmptyPath,

    /// The store path names a directory rather than a member of a set.
    #[error("'{0}' points to a directory")]
    IsDirectory(PathBuf),

    /// No base name could be derived from the store path.
    #[error("unable to determine base name of a store set from path '{0}'")]
    NoBaseName(String),

    /// A store shard failed to decode.
    #[error("failed to read store '{source_name}': {source}")]
    Store {
        source_name: String,
        #[source]
        source: FormatError,
    },

    /// The manifest failed to parse.
    #[error("failed to read manifest '{source_name}': {source}")]
    Manifest {
        source_name: String,
        #[source]
        source: FormatError,
    },

    /// The container archive could not be read.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure while discovering the set.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for explorer results.
pub type ExplorerResult<T> = Result<T, ExplorerError>;
