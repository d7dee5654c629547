//! # Cache Store
//!
//! Owns the on-disk layout of the cache and resolves every path inside it.
//! No other module concatenates store paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error::CacheError;

/// File extension of cached plugin artifacts.
pub const PLUGIN_EXT: &str = "hpi";

const LOCK_FILE: &str = ".cache-manager.lock";
const UPDATE_CENTER_FILE: &str = "update-center.json";
const STATS_REPORT_FILE: &str = "cache-stats.json";

/// A cached plugin artifact as found on disk.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    /// Plugin name (file stem, without the `.hpi` extension)
    pub name: String,
    /// Absolute path of the artifact file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last-modified timestamp
    pub modified: SystemTime,
}

/// The cache root and its fixed directory layout.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open the store at `root`, creating any missing subdirectories.
    ///
    /// Idempotent: existing content is never touched. Directories are
    /// created with mode `0o750` on Unix.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let store = Self { root: root.into() };
        for dir in [
            store.plugins_dir(),
            store.metadata_dir(),
            store.checksums_dir(),
            store.offline_dir(),
        ] {
            create_dir_restricted(&dir).map_err(|source| CacheError::StoreInit {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn checksums_dir(&self) -> PathBuf {
        self.root.join("checksums")
    }

    pub fn offline_dir(&self) -> PathBuf {
        self.root.join("offline")
    }

    /// Final path of a cached plugin artifact.
    pub fn plugin_path(&self, name: &str) -> PathBuf {
        self.plugins_dir().join(format!("{name}.{PLUGIN_EXT}"))
    }

    /// Staging path an in-flight download is written to before the atomic
    /// rename into [`plugin_path`](Self::plugin_path). The dot prefix keeps
    /// interrupted downloads out of [`artifacts`](Self::artifacts).
    pub fn plugin_part_path(&self, name: &str) -> PathBuf {
        self.plugins_dir().join(format!(".{name}.{PLUGIN_EXT}.part"))
    }

    /// Sidecar checksum record of a plugin artifact.
    pub fn checksum_path(&self, name: &str) -> PathBuf {
        self.checksums_dir().join(format!("{name}.sha256"))
    }

    pub fn update_center_path(&self) -> PathBuf {
        self.metadata_dir().join(UPDATE_CENTER_FILE)
    }

    pub fn stats_report_path(&self) -> PathBuf {
        self.metadata_dir().join(STATS_REPORT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Enumerate cached artifacts, sorted by name.
    ///
    /// Entries that cannot be stat'ed are skipped with a warning rather than
    /// failing the whole listing.
    pub fn artifacts(&self) -> io::Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.plugins_dir())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PLUGIN_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable artifact");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(ArtifactEntry {
                name: name.to_string(),
                path: path.clone(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Enumerate checksum records as `(plugin name, record path)` pairs.
    pub fn checksum_records(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.checksums_dir())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sha256") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                records.push((name.to_string(), path.clone()));
            }
        }
        records.sort();
        Ok(records)
    }
}

fn create_dir_restricted(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o750))?;
    }
    Ok(())
}
