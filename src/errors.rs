use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the cell wall measurement pipeline
#[derive(Error, Debug)]
pub enum CellWallError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Degenerate region{}: {reason}", .label.map(|l| format!(" {}", l)).unwrap_or_default())]
    DegenerateRegion {
        label: Option<u32>,
        reason: String,
    },

    #[error("Dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, CellWallError>;
