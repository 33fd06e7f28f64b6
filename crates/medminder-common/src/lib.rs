//! # MedMinder Common
//!
//! Shared pieces for the MedMinder service worker crates.
//!
//! ## Features
//!
//! - Logging configuration and subscriber setup
//! - A small error type for setup failures

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Errors raised while setting up shared infrastructure.
#[derive(Error, Debug)]
pub enum CommonError {
    /// The log filter directive could not be parsed.
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// Unknown log format name.
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
}

impl CommonError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CommonError::InvalidFilter { .. } => "filter",
            CommonError::AlreadyInitialized(_) => "init",
            CommonError::UnknownFormat(_) => "format",
        }
    }
}

/// Result type alias for setup operations.
pub type Result<T> = std::result::Result<T, CommonError>;
