//! # MedMinder Service Worker
//!
//! Background agent for the MedMinder web app.
//!
//! ## Features
//!
//! - **Lifecycle**: versioned precache on install, stale cache pruning on activate
//! - **Fetch Interception**: cache-first, network on miss
//! - **Push**: payload decode and notification render with fallback tiers
//! - **Notification clicks**: focus an open app window or open a new one
//! - **Client log relay**: every step is reported to open app windows
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker
//!     │
//!     ├── CacheLifecycle ──────── CacheStorage, Network, Registration
//!     ├── FetchInterceptor ────── CacheStorage, Network
//!     ├── PushPipeline ────────── NotificationHost
//!     ├── ClickHandler ────────── ClientsApi, NotificationHost
//!     ├── ControlMessages
//!     │
//!     └── ClientLogRelay ──────── ClientsApi (SW_LOG to every window)
//! ```
//!
//! The host APIs are traits in [`host`]; [`memory`] provides an in-process
//! implementation for tests and the replay harness. Every event handler
//! returns an [`EventTask`] the host awaits before treating the event as done.

use thiserror::Error;

pub mod chain;
pub mod click;
pub mod config;
pub mod fetch;
pub mod host;
pub mod lifecycle;
pub mod memory;
pub mod message;
pub mod push;
pub mod relay;
pub mod task;
pub mod worker;

pub use chain::{FallbackChain, Resolved, TierFailure};
pub use click::{ClickHandler, ClickOutcome, NotificationClickEvent, NotificationCloseEvent};
pub use config::WorkerConfig;
pub use fetch::FetchInterceptor;
pub use host::{
    CacheEntry, CacheStorage, Client, ClientMatchOptions, ClientType, ClientsApi, FetchRequest,
    FetchResponse, Host, Network, NotificationHost, NotificationId, NotificationOptions,
    NotificationRequest, Registration,
};
pub use lifecycle::{ActivationReport, CacheLifecycle};
pub use memory::MemoryHost;
pub use message::{ControlMessage, ControlMessages, MessageOutcome};
pub use push::{DecodeTier, PushEvent, PushOutcome, PushPayload, PushPipeline, PushReport};
pub use relay::{ClientLogRelay, LogKind, LogMessage};
pub use task::EventTask;
pub use worker::ServiceWorker;

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceWorkerError {
    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Precache failed for {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Clients error: {0}")]
    ClientsError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Event task '{event}' did not complete: {message}")]
    TaskFailed { event: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceWorkerError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::CacheError(_) => "cache",
            ServiceWorkerError::PrecacheFailed { .. } => "precache",
            ServiceWorkerError::NetworkError(_) => "network",
            ServiceWorkerError::NotificationError(_) => "notification",
            ServiceWorkerError::ClientsError(_) => "clients",
            ServiceWorkerError::ConfigError(_) => "config",
            ServiceWorkerError::TaskFailed { .. } => "task",
            ServiceWorkerError::NotFound(_) => "not_found",
        }
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
