// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum P1204Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Unsupported codec '{codec}' with bit depth {bit_depth}")]
    UnsupportedCodec { codec: String, bit_depth: u32 },

    #[error("Missing feature column: {0}")]
    MissingColumn(String),

    #[error("Malformed feature column '{column}': {reason}")]
    MalformedColumn { column: String, reason: String },

    #[error("Model configuration error: {0}")]
    Config(String),

    #[error("Failed to load residual model {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Residual model inference failed: {0}")]
    Inference(String),

    #[error("Plotting error: {0}")]
    Plot(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, P1204Error>;
