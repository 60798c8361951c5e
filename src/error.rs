use thiserror::Error;

use crate::result::SatResult;

#[derive(Error, Debug)]
pub enum PackingError {
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unrecognized interference format: {0}")]
    InterferenceFormat(String),

    #[error("Unknown station {0}")]
    UnknownStation(u32),

    #[error("Encoding invariant violated: {0}")]
    Encoding(String),

    #[error("Assignment failed verification: {0}")]
    UnverifiedAssignment(String),

    #[error("Cache conflict for {key}: stored {stored:?}, new {new:?}")]
    CacheConflict {
        key: String,
        stored: SatResult,
        new: SatResult,
    },

    #[error("Cache entry {0} does not match the instance (hash collision)")]
    HashCollision(String),

    #[error("Only SAT and UNSAT results can be cached, got {0:?}")]
    NotCacheable(SatResult),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackingError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackingError>;
