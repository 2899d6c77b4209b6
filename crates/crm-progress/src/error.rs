use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("progress store file at {path} is corrupt")]
    Corrupt { path: String },
}
