//! # Download Engine
//!
//! Fetches plugin artifacts and update-center metadata from an ordered set
//! of mirrors, with retry, failover and exponential backoff. One generic
//! loop drives both kinds of fetch; the per-URL operation is supplied by
//! the caller.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use reqwest::Client;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{
    FetchConfig, MAX_PARALLEL, MIN_PLUGIN_SIZE, RetryPolicy, UPDATE_CENTER_MAX_AGE,
};
use crate::error::CacheError;
use crate::integrity;
use crate::mirror::{MirrorSet, PluginRef};
use crate::store::CacheStore;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &FetchConfig) -> Result<Client, CacheError> {
    let provider = Arc::new(ring::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .unwrap()
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .user_agent(&config.user_agent)
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(CacheError::from)
}

/// Try `fetch` against each URL in order; when a full pass fails, sleep the
/// backoff for that attempt and pass again, up to the retry budget.
///
/// The backoff is only slept between passes, never after the last one.
pub async fn fetch_with_failover<T, F, Fut>(
    urls: &[String],
    retry: &RetryPolicy,
    mut fetch: F,
    subject: &str,
) -> Result<T, CacheError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    if urls.is_empty() {
        return Err(CacheError::NoMirrors);
    }

    let attempts = retry.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        for url in urls {
            match fetch(url.clone()).await {
                Ok(value) => {
                    debug!(%url, attempt, "fetch succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    debug!(%url, attempt, error = %e, "mirror failed");
                    last_error = e.to_string();
                }
            }
        }
        if attempt < attempts {
            let delay = retry.backoff_delay(attempt);
            warn!(
                subject,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "all mirrors failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(CacheError::MirrorsExhausted {
        name: subject.to_string(),
        attempts,
        last_error,
    })
}

async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, CacheError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(CacheError::StatusCode(response.status()));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Result of one plugin download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// Artifact already cached and no force-refresh requested
    Skipped,
}

/// Aggregate result of a batch download run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_fetched: u64,
    /// `(name, reason)` for every failed plugin
    pub failures: Vec<(String, String)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// Downloads plugin artifacts and catalog metadata into a cache store.
pub struct DownloadEngine {
    client: Client,
    mirrors: MirrorSet,
    update_centers: MirrorSet,
    retry: RetryPolicy,
    parallel: usize,
    force: bool,
    verify: bool,
}

impl DownloadEngine {
    pub fn new(
        config: &FetchConfig,
        mirrors: MirrorSet,
        update_centers: MirrorSet,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            client: create_client(config)?,
            mirrors,
            update_centers,
            retry: RetryPolicy::default(),
            parallel: 6,
            force: false,
            verify: true,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set download concurrency, clamped to `1..=16`.
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.clamp(1, MAX_PARALLEL);
        self
    }

    /// Re-download artifacts that are already cached.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable checksum record writing after downloads.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Download one plugin through the mirror set.
    ///
    /// An already-cached artifact short-circuits to `Skipped` with zero
    /// network activity unless force-refresh is set. The download is staged
    /// to a `.part` file, size-validated, then renamed into place, so an
    /// interrupted run never publishes a truncated artifact.
    pub async fn download_plugin(
        &self,
        store: &CacheStore,
        plugin: &PluginRef,
    ) -> Result<DownloadOutcome, CacheError> {
        let target = store.plugin_path(&plugin.name);
        if target.exists() && !self.force {
            debug!(plugin = %plugin, "artifact already cached, skipping");
            return Ok(DownloadOutcome::Skipped);
        }

        let urls = self.mirrors.resolve(plugin);
        let client = self.client.clone();
        let data = fetch_with_failover(
            &urls,
            &self.retry,
            |url| {
                let client = client.clone();
                async move { fetch_bytes(&client, &url).await }
            },
            &plugin.name,
        )
        .await?;

        // Mirrors have been seen serving HTML error pages with HTTP 200.
        if (data.len() as u64) < MIN_PLUGIN_SIZE {
            return Err(CacheError::Undersized {
                name: plugin.name.clone(),
                size: data.len() as u64,
            });
        }

        let staging = store.plugin_part_path(&plugin.name);
        tokio::fs::write(&staging, &data).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        if self.verify {
            let digest = hex::encode(Sha256::digest(&data));
            integrity::write_checksum(store, &plugin.name, &digest)?;
        }

        info!(plugin = %plugin, bytes = data.len(), "downloaded");
        Ok(DownloadOutcome::Downloaded {
            bytes: data.len() as u64,
        })
    }

    /// Refresh the cached update-center document if it is older than the
    /// freshness window (or force-refresh is set).
    ///
    /// The fetched payload must parse as JSON before it replaces the cached
    /// copy; the replacement itself is staged and renamed, so a failed fetch
    /// never corrupts the previous document. Returns whether a refresh
    /// happened.
    pub async fn refresh_update_center(&self, store: &CacheStore) -> Result<bool, CacheError> {
        let target = store.update_center_path();
        if !self.force && is_fresh(&target, UPDATE_CENTER_MAX_AGE) {
            debug!("update-center metadata is fresh, skipping refresh");
            return Ok(false);
        }

        let client = self.client.clone();
        let data = fetch_with_failover(
            self.update_centers.urls(),
            &self.retry,
            |url| {
                let client = client.clone();
                async move {
                    let data = fetch_bytes(&client, &url).await?;
                    // An HTML error page served with HTTP 200 fails the JSON
                    // gate and falls through to the next mirror.
                    serde_json::from_slice::<serde_json::Value>(&data)?;
                    Ok(data)
                }
            },
            "update-center",
        )
        .await?;

        let staging = store.metadata_dir().join(".update-center.json.part");
        tokio::fs::write(&staging, &data).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        info!(bytes = data.len(), "refreshed update-center metadata");
        Ok(true)
    }

    /// Download a set of plugins in batches of the configured concurrency.
    ///
    /// Batch N+1 starts only after batch N fully completes; running totals
    /// are logged after every batch. A failed plugin never aborts its batch.
    pub async fn download_all(&self, store: &CacheStore, plugins: &[PluginRef]) -> BatchReport {
        let mut report = BatchReport::default();
        let batches = plugins.chunks(self.parallel).count();

        for (index, batch) in plugins.chunks(self.parallel).enumerate() {
            let results = join_all(batch.iter().map(|p| self.download_plugin(store, p))).await;

            for (plugin, result) in batch.iter().zip(results) {
                match result {
                    Ok(DownloadOutcome::Downloaded { bytes }) => {
                        report.downloaded += 1;
                        report.bytes_fetched += bytes;
                    }
                    Ok(DownloadOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        warn!(plugin = %plugin, error = %e, "download failed");
                        report.failed += 1;
                        report.failures.push((plugin.name.clone(), e.to_string()));
                    }
                }
            }

            info!(
                batch = index + 1,
                batches,
                downloaded = report.downloaded,
                skipped = report.skipped,
                failed = report.failed,
                "batch complete"
            );
        }

        report
    }
}

fn is_fresh(path: &Path, max_age: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    // An mtime in the future counts as fresh.
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < max_age)
        .unwrap_or(true)
}
