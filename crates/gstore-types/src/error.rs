use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key id: {0}")]
    InvalidKeyId(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("path '{path}' does not resolve to an embedded record")]
    InvalidPath { path: String },
}
