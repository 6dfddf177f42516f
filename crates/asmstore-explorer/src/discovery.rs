//! Locating the stores and manifest that make up one set.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use asmstore_format::{Manifest, Retention, Store};
use zip::ZipArchive;

use crate::error::{ExplorerError, ExplorerResult};
use crate::naming::{self, MANIFEST_EXTENSION, STORE_EXTENSION};

/// Largest buffer reserved up front for an archive entry.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// One member of a store set, in discovery order.
#[derive(Debug)]
pub enum SetMember {
    Store { source: String, store: Store },
    Manifest { source: String, manifest: Manifest },
}

/// Read every `{base_name}.*` file in `dir`.
///
/// Entries are visited in file-name order so first-seen-wins lookups are
/// stable across platforms.
pub fn scan_directory(
    dir: &Path,
    base_name: &str,
    retention: Retention,
) -> ExplorerResult<Vec<SetMember>> {
    let prefix = format!("{base_name}.");
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix));
        if matches && entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut members = Vec::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let source = path.display().to_string();

        if naming::has_extension(name, STORE_EXTENSION, true) {
            let arch = naming::store_arch(name);
            let store = Store::open(&path, Some(&arch), retention).map_err(|source_err| {
                ExplorerError::Store {
                    source_name: source.clone(),
                    source: source_err,
                }
            })?;
            members.push(SetMember::Store { source, store });
        } else if naming::has_extension(name, MANIFEST_EXTENSION, true) {
            let file = File::open(&path)?;
            let manifest = Manifest::from_reader(file).map_err(|source_err| {
                ExplorerError::Manifest {
                    source_name: source.clone(),
                    source: source_err,
                }
            })?;
            members.push(SetMember::Manifest { source, manifest });
        } else {
            tracing::debug!(path = %source, "ignoring unrelated file");
        }
    }
    Ok(members)
}

/// Read every entry under `prefix` from an open archive.
///
/// Entry streams are buffered fully before decoding; archive streams cannot
/// be re-seeked once consumed. [`Retention::Mapped`] degrades to in-memory.
pub fn scan_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    prefix: &str,
    retention: Retention,
) -> ExplorerResult<Vec<SetMember>> {
    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !name.starts_with(prefix) || entry.is_dir() {
            continue;
        }

        let is_store = naming::has_extension(&name, STORE_EXTENSION, false);
        let is_manifest = naming::has_extension(&name, MANIFEST_EXTENSION, false);
        if !is_store && !is_manifest {
            continue;
        }

        // The declared size is untrusted; only use it as a bounded hint.
        let mut buf = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
        entry.read_to_end(&mut buf)?;

        if is_store {
            let arch = naming::store_arch(&name);
            let store = Store::from_bytes(buf, Some(&arch), retention).map_err(|source| {
                ExplorerError::Store {
                    source_name: name.clone(),
                    source,
                }
            })?;
            members.push(SetMember::Store { source: name, store });
        } else {
            let manifest = Manifest::from_reader(&buf[..]).map_err(|source| {
                ExplorerError::Manifest {
                    source_name: name.clone(),
                    source,
                }
            })?;
            members.push(SetMember::Manifest {
                source: name,
                manifest,
            });
        }
    }
    Ok(members)
}

/// Open an archive file and scan it.
pub fn scan_archive_file(
    path: &Path,
    prefix: &str,
    retention: Retention,
) -> ExplorerResult<Vec<SetMember>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    scan_archive(&mut archive, prefix, retention)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use asmstore_format::StoreWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn store_bytes(store_id: u32) -> Vec<u8> {
        let mut writer = StoreWriter::new(store_id);
        writer.add_module(b"image", None, None);
        writer.finish_to_bytes()
    }

    #[test]
    fn directory_scan_filters_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("assemblies.blob"), store_bytes(0)).unwrap();
        std::fs::write(dir.path().join("assemblies.arm64_v8a.BLOB"), store_bytes(1)).unwrap();
        std::fs::write(dir.path().join("assemblies.manifest"), "header\n").unwrap();
        std::fs::write(dir.path().join("assemblies.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("other.blob"), b"not part of the set").unwrap();

        let members = scan_directory(dir.path(), "assemblies", Retention::Discard).unwrap();
        assert_eq!(members.len(), 3);

        let arches: Vec<&str> = members
            .iter()
            .filter_map(|m| match m {
                SetMember::Store { store, .. } => Some(store.arch()),
                SetMember::Manifest { .. } => None,
            })
            .collect();
        assert_eq!(arches, ["arm64_v8a", ""]);
        assert!(members
            .iter()
            .any(|m| matches!(m, SetMember::Manifest { .. })));
    }

    #[test]
    fn directory_scan_propagates_bad_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("assemblies.blob"), b"garbage bytes here, definitely not").unwrap();
        let err = scan_directory(dir.path(), "assemblies", Retention::Discard).unwrap_err();
        assert!(matches!(err, ExplorerError::Store { .. }));
    }

    #[test]
    fn large_entry_is_read_past_the_preallocation_hint() {
        let mut writer = StoreWriter::new(1);
        let image = vec![0x42u8; MAX_PREALLOCATION as usize + 4096];
        writer.add_module(&image, None, None);

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("assemblies/assemblies.x86.blob", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&writer.finish_to_bytes()).unwrap();
        let mut archive = ZipArchive::new(zip.finish().unwrap()).unwrap();

        let members =
            scan_archive(&mut archive, "assemblies/assemblies.", Retention::InMemory).unwrap();
        let SetMember::Store { store, .. } = &members[0] else {
            panic!("expected a store");
        };
        let mut out = Vec::new();
        store
            .extract(&store.records()[0], asmstore_format::Region::Data, &mut out)
            .unwrap();
        assert_eq!(out.len(), image.len());
    }

    #[test]
    fn archive_scan_uses_prefix() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("assemblies/assemblies.blob", options).unwrap();
        zip.write_all(&store_bytes(0)).unwrap();
        zip.start_file("assemblies/assemblies.x86.blob", options).unwrap();
        zip.write_all(&store_bytes(1)).unwrap();
        zip.start_file("assemblies/assemblies.manifest", options).unwrap();
        zip.write_all(b"header\n0x1 0x1 1 0 Foo\n").unwrap();
        zip.start_file("lib/assemblies.blob", options).unwrap();
        zip.write_all(b"outside the prefix").unwrap();
        zip.start_file("assemblies/assemblies.x86.BLOB", options).unwrap();
        zip.write_all(b"suffix match is case-sensitive in archives").unwrap();
        let cursor = zip.finish().unwrap();

        let mut archive = ZipArchive::new(cursor).unwrap();
        let members =
            scan_archive(&mut archive, "assemblies/assemblies.", Retention::Mapped).unwrap();
        assert_eq!(members.len(), 3);
        match &members[1] {
            SetMember::Store { source, store } => {
                assert_eq!(source, "assemblies/assemblies.x86.blob");
                assert_eq!(store.arch(), "x86");
                assert!(store.has_data());
            }
            other => panic!("unexpected member {other:?}"),
        }
    }
}
