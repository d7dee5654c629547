//! # Retention / Eviction
//!
//! Keeps the store inside its age and size bounds. Eviction is split into a
//! pure planning step and an execution step so every removal decision can be
//! previewed without touching the store (dry-run contract).
//!
//! Phase 1 removes artifacts older than the age bound. Phase 2, if the
//! remaining total still exceeds the size bound, removes the oldest
//! artifacts one at a time until the total fits, tie-breaking equal
//! timestamps by name. Checksum records whose artifact is gone (or going)
//! are swept afterwards, as is a stale update-center document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::config::RetentionPolicy;
use crate::error::CacheError;
use crate::store::{ArtifactEntry, CacheStore};

/// Cached catalog metadata older than this is removed by eviction; it is
/// cheap to refetch.
pub const STALE_METADATA_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Every removal the policy calls for, computed without mutating the store.
#[derive(Debug, Default)]
pub struct EvictionPlan {
    /// Artifacts over the age bound (phase 1)
    pub expired: Vec<ArtifactEntry>,
    /// Artifacts displaced to satisfy the size bound (phase 2)
    pub displaced: Vec<ArtifactEntry>,
    /// Checksum records with no surviving artifact
    pub orphaned_checksums: Vec<PathBuf>,
    /// Stale catalog metadata files
    pub stale_metadata: Vec<PathBuf>,
}

/// What an executed plan actually removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvictionReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

impl EvictionPlan {
    /// Compute the plan for a store under the given policy.
    pub fn build(store: &CacheStore, policy: &RetentionPolicy) -> Result<Self, CacheError> {
        let artifacts = store.artifacts()?;
        let checksums = store.checksum_records()?;
        let update_center = {
            let path = store.update_center_path();
            fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(|modified| (path, modified))
        };
        Ok(Self::from_parts(
            artifacts,
            checksums,
            update_center,
            SystemTime::now(),
            policy,
        ))
    }

    /// Pure planning core, separated from the filesystem for testability.
    pub(crate) fn from_parts(
        artifacts: Vec<ArtifactEntry>,
        checksums: Vec<(String, PathBuf)>,
        update_center: Option<(PathBuf, SystemTime)>,
        now: SystemTime,
        policy: &RetentionPolicy,
    ) -> Self {
        let max_age = policy.max_age();
        let age_of = |entry: &ArtifactEntry| {
            now.duration_since(entry.modified).unwrap_or(Duration::ZERO)
        };

        // Phase 1: age bound.
        let (expired, mut kept): (Vec<_>, Vec<_>) =
            artifacts.into_iter().partition(|a| age_of(a) > max_age);

        // Phase 2: size bound, oldest first, name as the deterministic
        // tie-break for identical timestamps.
        kept.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
        let mut total: u64 = kept.iter().map(|a| a.size).sum();
        let mut displace_count = 0;
        for entry in &kept {
            if total <= policy.max_size_bytes {
                break;
            }
            total -= entry.size;
            displace_count += 1;
        }
        let displaced: Vec<_> = kept.drain(..displace_count).collect();

        // Checksum records must not outlive their artifact.
        let orphaned_checksums = checksums
            .into_iter()
            .filter(|(name, _)| !kept.iter().any(|a| &a.name == name))
            .map(|(_, path)| path)
            .collect();

        let stale_metadata = update_center
            .into_iter()
            .filter(|(_, modified)| {
                now.duration_since(*modified)
                    .map(|age| age > STALE_METADATA_MAX_AGE)
                    .unwrap_or(false)
            })
            .map(|(path, _)| path)
            .collect();

        Self {
            expired,
            displaced,
            orphaned_checksums,
            stale_metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
            && self.displaced.is_empty()
            && self.orphaned_checksums.is_empty()
            && self.stale_metadata.is_empty()
    }

    /// Artifact bytes the plan would free.
    pub fn bytes_to_free(&self) -> u64 {
        self.expired
            .iter()
            .chain(self.displaced.iter())
            .map(|a| a.size)
            .sum()
    }

    /// Number of files the plan would remove, checksum records and stale
    /// metadata included.
    pub fn files_to_remove(&self) -> usize {
        self.expired.len()
            + self.displaced.len()
            + self.orphaned_checksums.len()
            + self.stale_metadata.len()
    }

    /// Perform the planned removals.
    pub fn execute(&self) -> Result<EvictionReport, CacheError> {
        let mut report = EvictionReport::default();

        for artifact in self.expired.iter().chain(self.displaced.iter()) {
            debug!(plugin = %artifact.name, size = artifact.size, "evicting artifact");
            remove_file_counted(&artifact.path, &mut report)?;
            report.bytes_freed += artifact.size;
        }
        for path in &self.orphaned_checksums {
            debug!(path = %path.display(), "removing orphaned checksum record");
            remove_file_counted(path, &mut report)?;
        }
        for path in &self.stale_metadata {
            debug!(path = %path.display(), "removing stale catalog metadata");
            remove_file_counted(path, &mut report)?;
        }

        info!(
            files = report.files_removed,
            bytes = report.bytes_freed,
            "eviction complete"
        );
        Ok(report)
    }
}

/// Delete checksum records whose artifact file no longer exists. Used by
/// operations that mutate the artifact set without running full eviction.
pub fn sweep_orphan_checksums(store: &CacheStore) -> Result<usize, CacheError> {
    let names: Vec<String> = store.artifacts()?.into_iter().map(|a| a.name).collect();
    let mut removed = 0;
    for (name, path) in store.checksum_records()? {
        if !names.contains(&name) {
            debug!(plugin = %name, "removing orphaned checksum record");
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_file_counted(path: &Path, report: &mut EvictionReport) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => {
            report.files_removed += 1;
            Ok(())
        }
        // Already gone: the plan was computed from an earlier listing.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(name: &str, size: u64, age: Duration, now: SystemTime) -> ArtifactEntry {
        ArtifactEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("/cache/plugins/{name}.hpi")),
            size,
            modified: now - age,
        }
    }

    fn days(n: u64) -> Duration {
        Duration::from_secs(n * 86_400)
    }

    #[test]
    fn age_bound_removes_only_expired() {
        let now = SystemTime::now();
        let artifacts = vec![
            entry("young", 5000, days(1), now),
            entry("middling", 5000, days(10), now),
            entry("ancient", 5000, days(40), now),
        ];
        let policy = RetentionPolicy {
            max_age_days: 30,
            max_size_bytes: u64::MAX,
        };
        let plan = EvictionPlan::from_parts(artifacts, vec![], None, now, &policy);
        let expired: Vec<_> = plan.expired.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(expired, vec!["ancient"]);
        assert!(plan.displaced.is_empty());
    }

    #[test]
    fn size_bound_removes_exactly_the_oldest_surplus() {
        let now = SystemTime::now();
        // Five 1000-byte artifacts against a 2500-byte bound: the three
        // oldest must go, never a fourth.
        let artifacts = vec![
            entry("a", 1000, days(5), now),
            entry("b", 1000, days(4), now),
            entry("c", 1000, days(3), now),
            entry("d", 1000, days(2), now),
            entry("e", 1000, days(1), now),
        ];
        let policy = RetentionPolicy {
            max_age_days: 365,
            max_size_bytes: 2500,
        };
        let plan = EvictionPlan::from_parts(artifacts, vec![], None, now, &policy);
        assert!(plan.expired.is_empty());
        let displaced: Vec<_> = plan.displaced.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(displaced, vec!["a", "b", "c"]);
    }

    #[test]
    fn identical_timestamps_tie_break_by_name() {
        let now = SystemTime::now();
        let artifacts = vec![
            entry("zeta", 1000, days(2), now),
            entry("alpha", 1000, days(2), now),
            entry("mu", 1000, days(1), now),
        ];
        let policy = RetentionPolicy {
            max_age_days: 365,
            max_size_bytes: 2000,
        };
        let plan = EvictionPlan::from_parts(artifacts, vec![], None, now, &policy);
        let displaced: Vec<_> = plan.displaced.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(displaced, vec!["alpha"]);
    }

    #[test]
    fn evicted_artifacts_lose_their_checksums() {
        let now = SystemTime::now();
        let artifacts = vec![
            entry("keep", 1000, days(1), now),
            entry("expire", 1000, days(40), now),
        ];
        let checksums = vec![
            ("keep".to_string(), PathBuf::from("/c/keep.sha256")),
            ("expire".to_string(), PathBuf::from("/c/expire.sha256")),
            ("ghost".to_string(), PathBuf::from("/c/ghost.sha256")),
        ];
        let policy = RetentionPolicy {
            max_age_days: 30,
            max_size_bytes: u64::MAX,
        };
        let plan = EvictionPlan::from_parts(artifacts, checksums, None, now, &policy);
        // Both the evicted artifact's record and the pre-existing orphan go.
        assert_eq!(
            plan.orphaned_checksums,
            vec![
                PathBuf::from("/c/expire.sha256"),
                PathBuf::from("/c/ghost.sha256"),
            ]
        );
    }

    #[test]
    fn stale_metadata_is_swept_independently() {
        let now = SystemTime::now();
        let path = PathBuf::from("/cache/metadata/update-center.json");
        let policy = RetentionPolicy::default();

        let plan = EvictionPlan::from_parts(
            vec![],
            vec![],
            Some((path.clone(), now - days(2))),
            now,
            &policy,
        );
        assert_eq!(plan.stale_metadata, vec![path.clone()]);

        let plan =
            EvictionPlan::from_parts(vec![], vec![], Some((path, now - Duration::from_secs(3600))), now, &policy);
        assert!(plan.stale_metadata.is_empty());
    }

    #[test]
    fn execute_removes_orphans_from_disk() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        // A record whose artifact never existed in this run.
        fs::write(store.checksum_path("ghost"), "00".repeat(32)).unwrap();
        fs::write(store.plugin_path("kept"), vec![0u8; 2048]).unwrap();
        fs::write(store.checksum_path("kept"), "11".repeat(32)).unwrap();

        let plan = EvictionPlan::build(&store, &RetentionPolicy::default()).unwrap();
        assert_eq!(plan.orphaned_checksums, vec![store.checksum_path("ghost")]);

        let report = plan.execute().unwrap();
        assert_eq!(report.files_removed, 1);
        assert!(!store.checksum_path("ghost").exists());
        assert!(store.checksum_path("kept").exists());
        assert!(store.plugin_path("kept").exists());
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        fs::write(store.plugin_path("git"), vec![0u8; 4096]).unwrap();

        let policy = RetentionPolicy {
            max_age_days: 30,
            max_size_bytes: 1000,
        };
        let plan = EvictionPlan::build(&store, &policy).unwrap();
        assert_eq!(plan.files_to_remove(), 1);
        assert_eq!(plan.bytes_to_free(), 4096);
        // Planning alone must not remove anything.
        assert!(store.plugin_path("git").exists());
    }

    #[test]
    fn orphan_sweep_helper() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        fs::write(store.plugin_path("git"), vec![0u8; 2048]).unwrap();
        fs::write(store.checksum_path("git"), "00".repeat(32)).unwrap();
        fs::write(store.checksum_path("gone"), "00".repeat(32)).unwrap();

        let removed = sweep_orphan_checksums(&store).unwrap();
        assert_eq!(removed, 1);
        assert!(store.checksum_path("git").exists());
        assert!(!store.checksum_path("gone").exists());
    }
}
