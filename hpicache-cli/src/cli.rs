use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Offline-resilient Jenkins plugin cache manager",
    long_about = "Maintains a local cache of Jenkins plugin artifacts fed from multiple\n\
                  mirrors with retry and failover, protected by SHA-256 checksums,\n\
                  bounded by an age/size retention policy, and exportable as a portable\n\
                  snapshot for network-isolated controllers."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub operation: Operation,

    /// Root directory for the cache store
    #[arg(
        long,
        global = true,
        default_value = "/var/cache/hpicache",
        help = "Root directory for the cache store"
    )]
    pub cache_dir: PathBuf,

    /// Eviction age bound in days
    #[arg(
        long,
        global = true,
        default_value_t = 30,
        help = "Remove cached artifacts older than this many days"
    )]
    pub max_age: u64,

    /// Eviction size bound
    #[arg(
        long,
        global = true,
        default_value = "10",
        help = "Total store size bound. Bare numbers mean GB; units accepted, e.g. \"500MB\""
    )]
    pub max_size: String,

    /// Download concurrency
    #[arg(
        long,
        global = true,
        default_value_t = 6,
        value_parser = clap::value_parser!(u16).range(1..=16),
        help = "Maximum number of concurrent downloads (1-16)"
    )]
    pub parallel: u16,

    /// Retry attempts for network operations
    #[arg(
        long,
        global = true,
        default_value_t = 3,
        help = "Full passes over the mirror list before a download is declared failed"
    )]
    pub retry_count: u32,

    /// Initial backoff delay in seconds
    #[arg(
        long,
        global = true,
        default_value_t = 5,
        help = "Backoff before the second mirror pass, in seconds; doubles per pass"
    )]
    pub retry_delay: u64,

    /// Overall timeout per HTTP request in seconds
    #[arg(
        long,
        global = true,
        default_value_t = 30,
        help = "Overall timeout in seconds for one HTTP request"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = 10,
        help = "Connection timeout in seconds (time to establish the initial connection)"
    )]
    pub connect_timeout: u64,

    /// Replace the default mirror list
    #[arg(
        long = "mirror",
        global = true,
        value_name = "URL",
        help = "Plugin mirror base URL (can be used multiple times, tried in order)"
    )]
    pub mirrors: Vec<String>,

    /// Re-download artifacts that are already cached
    #[arg(long, global = true, help = "Re-download even if a local artifact exists")]
    pub force: bool,

    /// Skip checksum computation and validation
    #[arg(long, global = true, help = "Skip checksum computation/validation")]
    pub no_verify: bool,

    /// Report intended actions without mutating the store
    #[arg(long, global = true, help = "Report intended actions without mutating the store")]
    pub dry_run: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Operation {
    /// Download the plugins named in a manifest into the cache
    Populate {
        /// Manifest file: one `name` or `name:version` per line
        #[arg(long, value_name = "FILE")]
        plugin_list: PathBuf,

        /// Run eviction before downloading
        #[arg(long, help = "Apply the retention policy before downloading")]
        clean: bool,
    },

    /// Verify checksums of every cached artifact
    Verify,

    /// Apply the age/size retention policy and sweep orphaned records
    Clean,

    /// Summarize cache contents and health
    Stats,

    /// Refresh the catalog and re-download every cached plugin
    Sync,

    /// Export the cache as a portable offline snapshot
    Export,

    /// Import a snapshot archive over the store
    Import {
        /// Snapshot archive produced by `export`
        #[arg(long = "plugin-list", value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Populate { .. } => "populate",
            Self::Verify => "verify",
            Self::Clean => "clean",
            Self::Stats => "stats",
            Self::Sync => "sync",
            Self::Export => "export",
            Self::Import { .. } => "import",
        }
    }
}
