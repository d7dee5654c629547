//! # hpicache-engine
//!
//! An offline-resilient cache manager for Jenkins plugin artifacts.
//! Plugins are fetched from an ordered set of mirrors with retry and
//! failover, protected by SHA-256 checksum records, bounded by an age/size
//! retention policy, and exportable as portable offline snapshots.
//!
//! ## Features
//!
//! - Multi-mirror downloads with exponential backoff
//! - Atomic staged writes (no truncated artifact is ever published)
//! - Process-exclusive locking per cache root
//! - Age- and size-bounded eviction with dry-run planning
//! - Snapshot export/import for network-isolated hosts

pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod lock;
pub mod manifest;
pub mod mirror;
pub mod retention;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use builder::FetchConfigBuilder;
pub use config::{
    FetchConfig, MAX_PARALLEL, MIN_PLUGIN_SIZE, RetentionPolicy, RetryPolicy,
    UPDATE_CENTER_MAX_AGE,
};
pub use error::CacheError;
pub use fetch::{BatchReport, DownloadEngine, DownloadOutcome, fetch_with_failover};
pub use integrity::{VerifySummary, compute_checksum, verify_store};
pub use lock::PidLock;
pub use manifest::parse_plugin_list;
pub use mirror::{MirrorSet, PluginRef, PluginVersion};
pub use retention::{EvictionPlan, EvictionReport, sweep_orphan_checksums};
pub use snapshot::{SnapshotManifest, export_snapshot, import_snapshot, read_manifest};
pub use stats::{CacheReport, HealthStatus};
pub use store::{ArtifactEntry, CacheStore};
