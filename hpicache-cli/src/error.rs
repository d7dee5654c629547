use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] hpicache_engine::CacheError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("{failed} of {total} artifacts failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("{0} artifacts failed verification")]
    VerificationFailed(usize),

    #[error("interrupted by signal")]
    Interrupted,
}
