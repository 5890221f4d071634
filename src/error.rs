//! Error taxonomy for screenshot processing.
//!
//! Per-screenshot failures are recorded rather than raised: a batch never
//! aborts because one region could not be read. Only process-level concerns
//! (config, Tesseract invocation, I/O) travel as `anyhow::Error`.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single screenshot produced no record.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    /// The image file could not be opened or decoded.
    #[error("failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// No usable name after every cascade stage.
    #[error("no usable name recognised")]
    Recognition,
}

/// Failures of the online recognition service. Always logged, never fatal.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("online OCR API key is not configured")]
    MissingApiKey,

    #[error("failed to encode image for upload: {0}")]
    Encode(#[from] image::ImageError),

    #[error("online OCR request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("online OCR returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("online OCR reported an error: {0}")]
    Processing(String),
}
