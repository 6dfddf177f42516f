use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid store magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("invalid store format version: 0")]
    ZeroVersion,

    #[error("store format version {found} is higher than the highest supported version {max}")]
    UnsupportedVersion { found: u32, max: u32 },

    #[error("store truncated while reading {section}: {source}")]
    Truncated {
        section: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("store data not available: the store must be opened with in-memory or mapped retention")]
    DataUnavailable,

    #[error("record belongs to store {record_store_id}, not store {store_id}")]
    ForeignRecord { store_id: u32, record_store_id: u32 },

    #[error("region at offset {offset} with size {size} extends beyond store of {len} bytes")]
    RegionOutOfBounds { offset: u32, size: u32, len: usize },

    #[error("manifest line {line}: expected 5 fields, found {found}")]
    ManifestFieldCount { line: usize, found: usize },

    #[error("manifest line {line}: invalid {field} value '{value}'")]
    ManifestValue {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("refusing to write '{0}': file name must be a single path component")]
    UnsafeFileName(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FormatResult<T> = Result<T, FormatError>;

impl FormatError {
    /// Map a read failure on `section` into `Truncated` when the source ran dry.
    pub(crate) fn reading(section: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                Self::Truncated { section, source }
            } else {
                Self::Io(source)
            }
        }
    }
}
