//! Operation drivers: each CLI operation acquires the store lock, drives
//! the engine components it needs, and ends with a summary. Per-artifact
//! failures never abort a batch; whole-run failures (lock, configuration,
//! filesystem) abort immediately.

use std::time::Duration;

use tracing::{info, warn};

use hpicache_engine::{
    CacheStore, DownloadEngine, EvictionPlan, FetchConfig, MirrorSet, PidLock, PluginRef,
    RetentionPolicy, RetryPolicy, export_snapshot, import_snapshot, parse_plugin_list,
    read_manifest, stats, sweep_orphan_checksums, verify_store,
};

use crate::cli::{CliArgs, Operation};
use crate::error::AppError;
use crate::utils::{format_bytes, parse_max_size};

pub async fn run(args: CliArgs) -> Result<(), AppError> {
    let policy = RetentionPolicy {
        max_age_days: args.max_age,
        max_size_bytes: parse_max_size(&args.max_size)?,
    };

    let store = CacheStore::open(&args.cache_dir)?;
    let mut lock = PidLock::acquire(&store)?;
    info!(
        operation = args.operation.name(),
        cache_dir = %args.cache_dir.display(),
        "starting"
    );

    // The lock must go away on every exit path, signals included.
    let result = tokio::select! {
        result = dispatch(&args, &store, &policy) => result,
        _ = shutdown_signal() => {
            warn!("termination signal received, releasing lock");
            Err(AppError::Interrupted)
        }
    };
    lock.release();
    result
}

async fn dispatch(
    args: &CliArgs,
    store: &CacheStore,
    policy: &RetentionPolicy,
) -> Result<(), AppError> {
    match &args.operation {
        Operation::Populate { plugin_list, clean } => {
            populate(args, store, policy, plugin_list, *clean).await
        }
        Operation::Verify => verify(args, store),
        Operation::Clean => run_eviction(store, policy, args.dry_run),
        Operation::Stats => report_stats(args, store, policy),
        Operation::Sync => sync(args, store).await,
        Operation::Export => export(args, store),
        Operation::Import { archive } => import(args, store, archive),
    }
}

fn build_engine(args: &CliArgs) -> Result<DownloadEngine, AppError> {
    let mirrors = if args.mirrors.is_empty() {
        MirrorSet::jenkins_plugins()
    } else {
        MirrorSet::new(args.mirrors.iter().cloned())
    };

    let fetch_config = FetchConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .build();

    let engine =
        DownloadEngine::new(&fetch_config, mirrors, MirrorSet::jenkins_update_centers())?
            .with_retry(RetryPolicy {
                attempts: args.retry_count,
                initial_delay: Duration::from_secs(args.retry_delay),
            })
            .with_parallel(args.parallel as usize)
            .with_force(args.force)
            .with_verification(!args.no_verify);

    Ok(engine)
}

async fn populate(
    args: &CliArgs,
    store: &CacheStore,
    policy: &RetentionPolicy,
    plugin_list: &std::path::Path,
    clean: bool,
) -> Result<(), AppError> {
    let plugins = parse_plugin_list(plugin_list)?;
    if plugins.is_empty() {
        warn!(manifest = %plugin_list.display(), "manifest contains no plugin entries");
        return Ok(());
    }

    if clean {
        run_eviction(store, policy, args.dry_run)?;
    }

    if args.dry_run {
        let mut downloads = 0;
        for plugin in &plugins {
            if store.plugin_path(&plugin.name).exists() && !args.force {
                info!(plugin = %plugin, "already cached, would skip");
            } else {
                info!(plugin = %plugin, "would download");
                downloads += 1;
            }
        }
        info!(
            requested = plugins.len(),
            downloads, "dry run complete, store untouched"
        );
        return Ok(());
    }

    let engine = build_engine(args)?;
    // The catalog is a freshness aid, not a prerequisite.
    if let Err(e) = engine.refresh_update_center(store).await {
        warn!(error = %e, "update-center refresh failed, continuing with cached metadata");
    }

    let report = engine.download_all(store, &plugins).await;
    for (name, reason) in &report.failures {
        warn!(plugin = %name, reason = %reason, "download failed");
    }
    info!(
        requested = plugins.len(),
        downloaded = report.downloaded,
        skipped = report.skipped,
        failed = report.failed,
        fetched = %format_bytes(report.bytes_fetched),
        "populate finished"
    );

    if !report.all_succeeded() {
        return Err(AppError::PartialFailure {
            failed: report.failed,
            total: report.total(),
        });
    }
    Ok(())
}

fn verify(args: &CliArgs, store: &CacheStore) -> Result<(), AppError> {
    let summary = verify_store(store)?;
    for (name, reason) in &summary.failures {
        warn!(plugin = %name, reason = %reason, "verification failed");
        // Corrupt artifacts are not retained; the next populate run fetches
        // them fresh.
        if !args.dry_run {
            discard_artifact(store, name)?;
        }
    }
    info!(
        total = summary.total(),
        verified = summary.verified,
        missing_checksum = summary.missing_checksum,
        failed = summary.failed,
        "verification finished"
    );
    if summary.failed > 0 {
        return Err(AppError::VerificationFailed(summary.failed));
    }
    Ok(())
}

fn discard_artifact(store: &CacheStore, name: &str) -> Result<(), AppError> {
    for path in [store.plugin_path(name), store.checksum_path(name)] {
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

fn run_eviction(
    store: &CacheStore,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> Result<(), AppError> {
    let plan = EvictionPlan::build(store, policy)?;
    if plan.is_empty() {
        info!("store is within bounds, nothing to evict");
        return Ok(());
    }

    if dry_run {
        for artifact in &plan.expired {
            info!(plugin = %artifact.name, size = %format_bytes(artifact.size), "would evict (age bound)");
        }
        for artifact in &plan.displaced {
            info!(plugin = %artifact.name, size = %format_bytes(artifact.size), "would evict (size bound)");
        }
        for path in &plan.orphaned_checksums {
            info!(path = %path.display(), "would remove orphaned checksum");
        }
        for path in &plan.stale_metadata {
            info!(path = %path.display(), "would remove stale metadata");
        }
        info!(
            files = plan.files_to_remove(),
            freed = %format_bytes(plan.bytes_to_free()),
            "dry run complete, store untouched"
        );
        return Ok(());
    }

    let report = plan.execute()?;
    info!(
        files = report.files_removed,
        freed = %format_bytes(report.bytes_freed),
        "clean finished"
    );
    Ok(())
}

fn report_stats(
    args: &CliArgs,
    store: &CacheStore,
    policy: &RetentionPolicy,
) -> Result<(), AppError> {
    let report = stats::gather(store, policy)?;
    if !args.dry_run {
        stats::write_report(store, &report)?;
    }

    info!(
        artifacts = report.artifact_count,
        size = %format_bytes(report.artifact_bytes),
        bound = %format_bytes(report.max_size_bytes),
        checksums = report.checksum_count,
        metadata_files = report.metadata_count,
        "store contents"
    );
    if let Some(oldest) = &report.oldest_artifact {
        info!(plugin = %oldest.name, modified = %oldest.modified, "oldest artifact");
    }
    if let Some(newest) = &report.newest_artifact {
        info!(plugin = %newest.name, modified = %newest.modified, "newest artifact");
    }
    for issue in &report.issues {
        warn!(issue = %issue, "health issue");
    }
    info!(status = %report.status, "cache health");
    Ok(())
}

async fn sync(args: &CliArgs, store: &CacheStore) -> Result<(), AppError> {
    let artifacts = store.artifacts()?;
    if artifacts.is_empty() {
        warn!("store is empty, nothing to sync");
        return Ok(());
    }
    let plugins: Vec<PluginRef> = artifacts.iter().map(|a| PluginRef::latest(&a.name)).collect();

    if args.dry_run {
        info!(
            plugins = plugins.len(),
            "would refresh the catalog and re-download every cached plugin"
        );
        return Ok(());
    }

    // Sync always refreshes, regardless of --force.
    let engine = build_engine(args)?.with_force(true);
    if let Err(e) = engine.refresh_update_center(store).await {
        warn!(error = %e, "update-center refresh failed, continuing with cached metadata");
    }

    let report = engine.download_all(store, &plugins).await;
    for (name, reason) in &report.failures {
        warn!(plugin = %name, reason = %reason, "download failed");
    }
    let orphans = sweep_orphan_checksums(store)?;
    info!(
        refreshed = report.downloaded,
        failed = report.failed,
        orphans_removed = orphans,
        fetched = %format_bytes(report.bytes_fetched),
        "sync finished"
    );

    if !report.all_succeeded() {
        return Err(AppError::PartialFailure {
            failed: report.failed,
            total: report.total(),
        });
    }
    Ok(())
}

fn export(args: &CliArgs, store: &CacheStore) -> Result<(), AppError> {
    if args.dry_run {
        let count = store.artifacts()?.len();
        if count == 0 {
            return Err(hpicache_engine::CacheError::EmptyCache.into());
        }
        info!(artifacts = count, "would export snapshot");
        return Ok(());
    }

    let (archive, manifest) = export_snapshot(store, env!("CARGO_PKG_VERSION"))?;
    info!(
        archive = %archive.display(),
        artifacts = manifest.artifact_count,
        size = %format_bytes(manifest.total_bytes),
        "export finished"
    );
    Ok(())
}

fn import(args: &CliArgs, store: &CacheStore, archive: &std::path::Path) -> Result<(), AppError> {
    if args.dry_run {
        match read_manifest(archive)? {
            Some(manifest) => info!(
                artifacts = manifest.artifact_count,
                exported_at = %manifest.exported_at,
                tool_version = %manifest.tool_version,
                "would import snapshot"
            ),
            None => info!(
                archive = %archive.display(),
                "would import snapshot (no manifest sidecar found)"
            ),
        }
        return Ok(());
    }

    let count = import_snapshot(store, archive)?;
    info!(artifacts = count, "import finished");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
