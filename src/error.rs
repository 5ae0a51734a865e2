use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Unknown order key: {0}")]
    UnknownOrder(String),

    #[error("Filter index {index} out of range for {len} filters")]
    FilterIndex { index: i64, len: usize },

    #[error("Filter {index} is {actual:?}, expected {expected:?}")]
    FilterMismatch {
        index: usize,
        actual: String,
        expected: String,
    },

    #[error("Cannot convert {0} bits to hex nibbles")]
    HashBits(usize),

    #[error("Invalid hash size: {0}")]
    HashSize(String),

    #[error("Invalid nibbles: {0:?}")]
    InvalidNibbles(String),

    #[error("Unknown hash method: {0}")]
    UnknownMethod(String),

    #[error("Invalid export format: {0}")]
    InvalidFormat(String),

    #[error("Hash stride must be a positive number of seconds, got {0}")]
    InvalidStride(f64),

    #[error("Invalid timestamp: {0}")]
    InvalidStamp(String),

    #[error("Processing failed for {path}: {message}")]
    Processing { path: PathBuf, message: String },

    #[error("Asset not found: {0}")]
    AssetNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
