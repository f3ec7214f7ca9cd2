// src/utils/mod.rs
pub mod debug_text;
pub mod error;
pub mod logging;
pub mod numbers;

pub use error::AppError; // Re-export main error type for convenience
