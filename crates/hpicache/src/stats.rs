//! # Stats / Health Reporter
//!
//! Aggregates store contents into a report for operators. Health
//! degradation is informational only; gathering never fails because the
//! store is unhealthy.

use std::fmt;
use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RetentionPolicy;
use crate::error::CacheError;
use crate::store::CacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("HEALTHY"),
            Self::Warning => f.write_str("WARNING"),
        }
    }
}

/// Name and timestamp of a boundary artifact (oldest or newest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStamp {
    pub name: String,
    /// RFC 3339 last-modified timestamp
    pub modified: String,
}

/// Operator-facing summary of the store, also persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    /// RFC 3339 generation timestamp
    pub generated_at: String,
    pub artifact_count: usize,
    pub artifact_bytes: u64,
    pub checksum_count: usize,
    pub metadata_count: usize,
    pub metadata_bytes: u64,
    pub oldest_artifact: Option<ArtifactStamp>,
    pub newest_artifact: Option<ArtifactStamp>,
    /// Configured size bound the totals are judged against
    pub max_size_bytes: u64,
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

/// Gather a report over the store under the given policy.
pub fn gather(store: &CacheStore, policy: &RetentionPolicy) -> Result<CacheReport, CacheError> {
    let artifacts = store.artifacts()?;
    let checksum_count = store.checksum_records()?.len();

    let artifact_bytes: u64 = artifacts.iter().map(|a| a.size).sum();
    let oldest = artifacts.iter().min_by_key(|a| a.modified).map(stamp);
    let newest = artifacts.iter().max_by_key(|a| a.modified).map(stamp);

    let (metadata_count, metadata_bytes) = dir_totals(store)?;

    let mut issues = Vec::new();
    if artifact_bytes > policy.max_size_bytes {
        issues.push(format!(
            "total size {artifact_bytes} bytes exceeds the {} byte bound",
            policy.max_size_bytes
        ));
    }
    if artifacts.is_empty() {
        issues.push("cache contains no artifacts".to_string());
    } else if checksum_count * 2 < artifacts.len() {
        issues.push(format!(
            "checksum coverage is below 50% ({checksum_count} of {})",
            artifacts.len()
        ));
    }

    let status = if issues.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Warning
    };

    Ok(CacheReport {
        generated_at: Utc::now().to_rfc3339(),
        artifact_count: artifacts.len(),
        artifact_bytes,
        checksum_count,
        metadata_count,
        metadata_bytes,
        oldest_artifact: oldest,
        newest_artifact: newest,
        max_size_bytes: policy.max_size_bytes,
        status,
        issues,
    })
}

/// Persist the report to `metadata/cache-stats.json` for machine consumers.
pub fn write_report(store: &CacheStore, report: &CacheReport) -> Result<(), CacheError> {
    fs::write(
        store.stats_report_path(),
        serde_json::to_string_pretty(report)?,
    )?;
    Ok(())
}

fn stamp(artifact: &crate::store::ArtifactEntry) -> ArtifactStamp {
    ArtifactStamp {
        name: artifact.name.clone(),
        modified: DateTime::<Utc>::from(artifact.modified).to_rfc3339(),
    }
}

fn dir_totals(store: &CacheStore) -> Result<(usize, u64), CacheError> {
    let mut count = 0;
    let mut bytes = 0;
    for entry in fs::read_dir(store.metadata_dir())? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            count += 1;
            bytes += metadata.len();
        }
    }
    Ok((count, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity;
    use tempfile::tempdir;

    fn add_artifact(store: &CacheStore, name: &str, with_checksum: bool) {
        fs::write(store.plugin_path(name), vec![0u8; 2048]).unwrap();
        if with_checksum {
            let digest = integrity::compute_checksum(&store.plugin_path(name)).unwrap();
            integrity::write_checksum(store, name, &digest).unwrap();
        }
    }

    #[test]
    fn empty_store_warns() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let report = gather(&store, &RetentionPolicy::default()).unwrap();
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.artifact_count, 0);
        assert!(report.oldest_artifact.is_none());
        assert!(report.issues.iter().any(|i| i.contains("no artifacts")));
    }

    #[test]
    fn covered_store_is_healthy() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        add_artifact(&store, "git", true);
        add_artifact(&store, "credentials", true);

        let report = gather(&store, &RetentionPolicy::default()).unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.artifact_count, 2);
        assert_eq!(report.artifact_bytes, 4096);
        assert_eq!(report.checksum_count, 2);
        assert!(report.issues.is_empty());
        assert!(report.oldest_artifact.is_some());
    }

    #[test]
    fn low_checksum_coverage_warns() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        add_artifact(&store, "a", true);
        add_artifact(&store, "b", false);
        add_artifact(&store, "c", false);

        let report = gather(&store, &RetentionPolicy::default()).unwrap();
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.issues.iter().any(|i| i.contains("coverage")));
    }

    #[test]
    fn oversize_store_warns() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        add_artifact(&store, "git", true);

        let policy = RetentionPolicy {
            max_age_days: 30,
            max_size_bytes: 1024,
        };
        let report = gather(&store, &policy).unwrap();
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.issues.iter().any(|i| i.contains("exceeds")));
    }

    #[test]
    fn report_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        add_artifact(&store, "git", true);

        let report = gather(&store, &RetentionPolicy::default()).unwrap();
        write_report(&store, &report).unwrap();

        let parsed: CacheReport =
            serde_json::from_str(&fs::read_to_string(store.stats_report_path()).unwrap()).unwrap();
        assert_eq!(parsed.artifact_count, 1);
        assert_eq!(parsed.status, HealthStatus::Healthy);
    }
}
