//! Naming conventions shared by every store set: base names, architecture
//! tags and the in-archive location of the stores.

use std::fmt;
use std::path::Path;

/// Base name used for sets discovered inside an archive.
pub const ARCHIVE_BASE_NAME: &str = "assemblies";
/// Suffix appended to extension-less paths to form a base name.
pub const BASE_NAME_SUFFIX: &str = "_assemblies";
pub const STORE_EXTENSION: &str = "blob";
pub const MANIFEST_EXTENSION: &str = "manifest";

/// Container archive kinds that can carry a store set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Android app bundle.
    Aab,
    /// Android package.
    Apk,
    /// Plain zip with the bundle's `root/` layout.
    Zip,
}

impl ArchiveKind {
    /// Match an extension (without the dot), ignoring ASCII case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("aab") {
            Some(Self::Aab)
        } else if ext.eq_ignore_ascii_case("apk") {
            Some(Self::Apk)
        } else if ext.eq_ignore_ascii_case("zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Directory inside the archive that holds the stores.
    pub fn stores_dir(self) -> &'static str {
        match self {
            Self::Aab => "base/root/assemblies",
            Self::Apk => "assemblies",
            Self::Zip => "root/assemblies",
        }
    }

    /// Entry-name prefix shared by every member of the set `base_name`.
    pub fn entry_prefix(self, base_name: &str) -> String {
        format!("{}/{base_name}.", self.stores_dir())
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aab => write!(f, "aab"),
            Self::Apk => write!(f, "apk"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// Derive the store-set base name from any member path.
///
/// - no extension: the file name, suffixed with `_assemblies` unless it already is
/// - archive extension: `assemblies`
/// - anything else: the file stem up to its first `.`
pub fn base_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty());

    let name = match extension {
        None => {
            let lower = file_name.to_ascii_lowercase();
            if lower.ends_with(BASE_NAME_SUFFIX) {
                file_name.to_string()
            } else {
                format!("{file_name}{BASE_NAME_SUFFIX}")
            }
        }
        Some(ext) if ArchiveKind::from_extension(ext).is_some() => ARCHIVE_BASE_NAME.to_string(),
        Some(_) => {
            let stem = path.file_stem()?.to_str()?;
            stem.split('.').next().unwrap_or(stem).to_string()
        }
    };

    (!name.is_empty()).then_some(name)
}

/// Architecture tag embedded in a store name: `assemblies.arm64_v8a.blob`
/// yields `arm64_v8a`, `assemblies.blob` yields an empty string.
///
/// Works for filesystem paths and `/`-separated archive entry names.
pub fn store_arch(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| Path::new(stem).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Whether `name` ends with `.{extension}`, optionally ignoring ASCII case.
pub(crate) fn has_extension(name: &str, extension: &str, ignore_case: bool) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    if ignore_case {
        ext.eq_ignore_ascii_case(extension)
    } else {
        ext == extension
    }
}
