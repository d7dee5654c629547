//! # Snapshot Manager
//!
//! Packages the cache into a portable `tar.gz` bundle for transfer to
//! network-isolated hosts, and restores from one. Every archive carries a
//! sidecar `.info` manifest so an import decision never requires inspecting
//! archive contents.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CacheError;
use crate::store::CacheStore;

/// Directories bundled into a snapshot, relative to the cache root.
const SNAPSHOT_DIRS: [&str; 3] = ["plugins", "metadata", "checksums"];

/// Sidecar description of an exported snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// RFC 3339 export timestamp
    pub exported_at: String,
    /// Number of plugin artifacts in the bundle
    pub artifact_count: usize,
    /// Total artifact bytes in the bundle
    pub total_bytes: u64,
    /// Version of the tool that produced the bundle
    pub tool_version: String,
}

/// Export the store into `offline/` as a timestamped `tar.gz` plus its
/// `.info` manifest. Fails with [`CacheError::EmptyCache`] when the store
/// holds no artifacts.
pub fn export_snapshot(
    store: &CacheStore,
    tool_version: &str,
) -> Result<(PathBuf, SnapshotManifest), CacheError> {
    let artifacts = store.artifacts()?;
    if artifacts.is_empty() {
        return Err(CacheError::EmptyCache);
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let archive_name = format!("hpicache-{stamp}.tar.gz");
    let archive_path = store.offline_dir().join(&archive_name);

    let file = File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for dir in SNAPSHOT_DIRS {
        let src = store.root().join(dir);
        if src.is_dir() {
            builder.append_dir_all(dir, &src)?;
        }
    }
    builder.into_inner()?.finish()?;

    let manifest = SnapshotManifest {
        exported_at: Utc::now().to_rfc3339(),
        artifact_count: artifacts.len(),
        total_bytes: artifacts.iter().map(|a| a.size).sum(),
        tool_version: tool_version.to_string(),
    };
    let info_path = store.offline_dir().join(format!("{archive_name}.info"));
    fs::write(&info_path, serde_json::to_string_pretty(&manifest)?)?;

    info!(
        archive = %archive_path.display(),
        artifacts = manifest.artifact_count,
        "exported snapshot"
    );
    Ok((archive_path, manifest))
}

/// Read the sidecar manifest of an archive, if one exists next to it.
pub fn read_manifest(archive: &Path) -> Result<Option<SnapshotManifest>, CacheError> {
    let Some(name) = archive.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let info_path = archive.with_file_name(format!("{name}.info"));
    if !info_path.exists() {
        return Ok(None);
    }
    let manifest = serde_json::from_str(&fs::read_to_string(info_path)?)?;
    Ok(Some(manifest))
}

/// Extract a snapshot archive over the store.
///
/// The existing `plugins/`, `metadata/` and `checksums/` trees are copied
/// into a timestamped `backup-*/` directory under the cache root first, so
/// a bad import is recoverable. Returns the artifact count after import.
pub fn import_snapshot(store: &CacheStore, archive: &Path) -> Result<usize, CacheError> {
    if !archive.is_file() {
        return Err(CacheError::Import(format!(
            "archive not found: {}",
            archive.display()
        )));
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let backup_dir = store.root().join(format!("backup-{stamp}"));
    for dir in SNAPSHOT_DIRS {
        let src = store.root().join(dir);
        if src.is_dir() {
            copy_dir(&src, &backup_dir.join(dir))?;
        }
    }
    info!(backup = %backup_dir.display(), "backed up store before import");

    let file = File::open(archive)?;
    let mut bundle = tar::Archive::new(GzDecoder::new(file));
    bundle
        .unpack(store.root())
        .map_err(|e| CacheError::Import(e.to_string()))?;

    let count = store.artifacts()?.len();
    info!(artifacts = count, "imported snapshot");
    Ok(count)
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity;
    use tempfile::tempdir;

    fn seed_store(store: &CacheStore) {
        for (name, fill) in [("git", 7u8), ("credentials", 9u8)] {
            fs::write(store.plugin_path(name), vec![fill; 2048]).unwrap();
            let digest = integrity::compute_checksum(&store.plugin_path(name)).unwrap();
            integrity::write_checksum(store, name, &digest).unwrap();
        }
        fs::write(store.update_center_path(), b"{\"plugins\":{}}").unwrap();
    }

    #[test]
    fn empty_store_refuses_export() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        assert!(matches!(
            export_snapshot(&store, "0.0.0"),
            Err(CacheError::EmptyCache)
        ));
    }

    #[test]
    fn export_import_round_trip() {
        let src_dir = tempdir().unwrap();
        let src = CacheStore::open(src_dir.path()).unwrap();
        seed_store(&src);

        let (archive, manifest) = export_snapshot(&src, "0.0.0").unwrap();
        assert!(archive.exists());
        assert_eq!(manifest.artifact_count, 2);
        assert_eq!(manifest.total_bytes, 4096);

        // The sidecar manifest alone describes the bundle.
        let sidecar = read_manifest(&archive).unwrap().unwrap();
        assert_eq!(sidecar.artifact_count, 2);
        assert_eq!(sidecar.tool_version, "0.0.0");

        let dst_dir = tempdir().unwrap();
        let dst = CacheStore::open(dst_dir.path()).unwrap();
        let count = import_snapshot(&dst, &archive).unwrap();
        assert_eq!(count, 2);

        for name in ["git", "credentials"] {
            assert_eq!(
                integrity::compute_checksum(&dst.plugin_path(name)).unwrap(),
                fs::read_to_string(dst.checksum_path(name)).unwrap()
            );
        }
    }

    #[test]
    fn import_backs_up_existing_contents() {
        let src_dir = tempdir().unwrap();
        let src = CacheStore::open(src_dir.path()).unwrap();
        seed_store(&src);
        let (archive, _) = export_snapshot(&src, "0.0.0").unwrap();

        let dst_dir = tempdir().unwrap();
        let dst = CacheStore::open(dst_dir.path()).unwrap();
        fs::write(dst.plugin_path("prior"), vec![1u8; 2048]).unwrap();

        import_snapshot(&dst, &archive).unwrap();

        let backup = fs::read_dir(dst.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("backup-"))
            .expect("backup directory missing");
        assert!(backup.path().join("plugins/prior.hpi").exists());
        // The imported artifacts land alongside what was already there.
        assert!(dst.plugin_path("git").exists());
        assert!(dst.plugin_path("prior").exists());
    }

    #[test]
    fn corrupt_archive_fails_and_keeps_backup() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        fs::write(store.plugin_path("prior"), vec![1u8; 2048]).unwrap();

        let bogus = dir.path().join("not-a-snapshot.tar.gz");
        fs::write(&bogus, b"definitely not gzip").unwrap();

        assert!(matches!(
            import_snapshot(&store, &bogus),
            Err(CacheError::Import(_))
        ));
        assert!(store.plugin_path("prior").exists());
    }

    #[test]
    fn missing_archive_is_an_import_error() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let missing = dir.path().join("nope.tar.gz");
        assert!(matches!(
            import_snapshot(&store, &missing),
            Err(CacheError::Import(_))
        ));
    }
}
