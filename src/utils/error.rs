// src/utils/error.rs
use std::time::Duration;
use thiserror::Error;

// Define specific error types for different parts of the application

/// Raised only when a document cannot be processed at all.
/// Structural misses inside a document are never errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Document has neither text nor tables")]
    NoData,

    #[error("Invalid input document: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("Text generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed generator response: {0}")]
    MalformedResponse(String),

    #[error("Fallback configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("External fallback failed: {0}")]
    Fallback(#[from] FallbackError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
