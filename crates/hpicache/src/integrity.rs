//! # Integrity Verifier
//!
//! SHA-256 computation and artifact verification against sidecar checksum
//! records.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::MIN_PLUGIN_SIZE;
use crate::error::CacheError;
use crate::store::CacheStore;

/// Outcome of checking one artifact against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Pass,
    Mismatch { expected: String, actual: String },
}

/// Aggregate result of verifying a whole store.
#[derive(Debug, Default)]
pub struct VerifySummary {
    /// Artifacts whose checksum record matched
    pub verified: usize,
    /// Artifacts with no checksum record (soft pass)
    pub missing_checksum: usize,
    /// Artifacts that are undersized or whose checksum mismatched
    pub failed: usize,
    /// `(name, reason)` for every failure
    pub failures: Vec<(String, String)>,
}

impl VerifySummary {
    pub fn total(&self) -> usize {
        self.verified + self.missing_checksum + self.failed
    }
}

/// Compute the hex SHA-256 digest of a file, streaming in 64 KiB chunks.
pub fn compute_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Check a single artifact file against an expected digest.
pub fn verify_artifact(path: &Path, expected: &str) -> io::Result<Verification> {
    let actual = compute_checksum(path)?;
    if actual == expected.trim() {
        Ok(Verification::Pass)
    } else {
        Ok(Verification::Mismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Write (or refresh) the checksum record for a plugin.
pub fn write_checksum(store: &CacheStore, name: &str, digest: &str) -> io::Result<()> {
    fs::write(store.checksum_path(name), digest)
}

/// Verify every artifact in the store.
///
/// Classification: undersized files and checksum mismatches are failures.
/// A missing checksum record is a soft pass — plugins cached before checksum
/// tracking existed are counted and logged, not failed.
pub fn verify_store(store: &CacheStore) -> Result<VerifySummary, CacheError> {
    let mut summary = VerifySummary::default();
    for artifact in store.artifacts()? {
        if artifact.size < MIN_PLUGIN_SIZE {
            warn!(
                plugin = %artifact.name,
                size = artifact.size,
                "artifact below minimum plausible size"
            );
            summary.failed += 1;
            summary.failures.push((
                artifact.name.clone(),
                format!("implausibly small ({} bytes)", artifact.size),
            ));
            continue;
        }

        let record = store.checksum_path(&artifact.name);
        if !record.exists() {
            debug!(plugin = %artifact.name, "no checksum record, skipping validation");
            summary.missing_checksum += 1;
            continue;
        }

        let expected = fs::read_to_string(&record)?;
        match verify_artifact(&artifact.path, &expected)? {
            Verification::Pass => {
                write_checksum(store, &artifact.name, expected.trim())?;
                summary.verified += 1;
            }
            Verification::Mismatch { expected, actual } => {
                warn!(plugin = %artifact.name, %expected, %actual, "checksum mismatch");
                summary.failed += 1;
                summary.failures.push((
                    artifact.name.clone(),
                    format!("checksum mismatch (expected {expected}, actual {actual})"),
                ));
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checksum_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            compute_checksum(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn mismatch_is_classified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"hello world").unwrap();
        match verify_artifact(&path, &"0".repeat(64)).unwrap() {
            Verification::Mismatch { expected, actual } => {
                assert_eq!(expected, "0".repeat(64));
                assert_eq!(
                    actual,
                    "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
                );
            }
            Verification::Pass => panic!("expected mismatch"),
        }
    }

    #[test]
    fn store_verification_classifies_all_three_ways() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();

        // Verified: artifact with a correct record.
        let good = vec![7u8; 2048];
        fs::write(store.plugin_path("good"), &good).unwrap();
        let digest = compute_checksum(&store.plugin_path("good")).unwrap();
        write_checksum(&store, "good", &digest).unwrap();

        // Soft pass: artifact with no record.
        fs::write(store.plugin_path("legacy"), vec![3u8; 4096]).unwrap();

        // Failed: record present but the file was replaced.
        fs::write(store.plugin_path("tampered"), vec![1u8; 2048]).unwrap();
        write_checksum(&store, "tampered", &"0".repeat(64)).unwrap();

        // Failed: undersized.
        fs::write(store.plugin_path("tiny"), vec![0u8; 10]).unwrap();

        let summary = verify_store(&store).unwrap();
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.missing_checksum, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total(), 4);
        let failed_names: Vec<_> = summary.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert!(failed_names.contains(&"tampered"));
        assert!(failed_names.contains(&"tiny"));
    }
}
