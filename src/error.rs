use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures only. Malformed documents degrade instead of erroring.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Font file could not be parsed as a TrueType/OpenType face.
    #[error("font error: {0}")]
    Font(String),

    /// Section ranges handed to the engine overlap or are out of document order.
    #[error("invalid section ranges: {0}")]
    InvalidSectionRanges(String),
}
