use thiserror::Error;

/// Errors surfaced by [`crate::CacheStore`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry header corrupt at {path}")]
    CorruptHeader { path: String },
}
