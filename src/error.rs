//! Error types for silt

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index corruption: {0}")]
    Corruption(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Layering error: {0}")]
    Layering(String),

    #[error("Query deadline exceeded")]
    DeadlineExceeded,
}

pub type Result<T> = std::result::Result<T, Error>;
