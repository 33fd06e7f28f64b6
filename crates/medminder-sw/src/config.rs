//! Worker configuration.
//!
//! Everything the worker needs to know about its deployment is injected
//! through [`WorkerConfig`] at startup: the versioned cache bucket name, the
//! precache list, notification assets and the click route.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Prefix of every cache bucket this worker owns.
pub const CACHE_PREFIX: &str = "medminder-cache-v";

/// Cache version used when none is configured.
pub const DEFAULT_CACHE_VERSION: u32 = 1;

/// Title used when a push payload carries none.
pub const DEFAULT_TITLE: &str = "Medication Reminder";

/// Body used when a push payload carries none.
pub const DEFAULT_BODY: &str = "It's time to take your medication.";

/// Title of the minimal notification shown when the primary render fails.
pub const FALLBACK_TITLE: &str = "MedMinder";

/// Body of the minimal notification shown when the primary render fails.
pub const FALLBACK_BODY: &str = "You have a new medication reminder.";

/// Notification icon, also precached.
pub const NOTIFICATION_ICON: &str = "/notification-icon.png";

/// Route opened when no app window is already open.
pub const CLICK_ROUTE: &str = "/notifications";

/// Build the bucket name for a cache version.
pub fn cache_name_for_version(version: u32) -> String {
    format!("{}{}", CACHE_PREFIX, version)
}

/// Service worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin the worker is registered under.
    pub origin: Url,

    /// Current cache bucket name. Changing it invalidates every older bucket.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Same-origin paths populated on install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// Notification icon reference.
    #[serde(default = "default_icon")]
    pub icon: String,

    /// Notification badge reference.
    #[serde(default = "default_icon")]
    pub badge: String,

    /// Route opened on notification click when no window matches.
    #[serde(default = "default_click_route")]
    pub click_route: String,

    #[serde(default = "default_title")]
    pub default_title: String,

    #[serde(default = "default_body")]
    pub default_body: String,

    #[serde(default = "fallback_title")]
    pub fallback_title: String,

    #[serde(default = "fallback_body")]
    pub fallback_body: String,

    /// Ask the host to skip the waiting phase after a successful install.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Claim open clients once activated.
    #[serde(default = "default_true")]
    pub claim_clients: bool,
}

fn default_cache_name() -> String {
    cache_name_for_version(DEFAULT_CACHE_VERSION)
}

fn default_precache_urls() -> Vec<String> {
    vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        NOTIFICATION_ICON.to_string(),
    ]
}

fn default_icon() -> String {
    NOTIFICATION_ICON.to_string()
}

fn default_click_route() -> String {
    CLICK_ROUTE.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

fn fallback_title() -> String {
    FALLBACK_TITLE.to_string()
}

fn fallback_body() -> String {
    FALLBACK_BODY.to_string()
}

fn default_true() -> bool {
    true
}

impl WorkerConfig {
    /// Create a configuration with defaults for the given origin.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cache_name: default_cache_name(),
            precache_urls: default_precache_urls(),
            icon: default_icon(),
            badge: default_icon(),
            click_route: default_click_route(),
            default_title: default_title(),
            default_body: default_body(),
            fallback_title: fallback_title(),
            fallback_body: fallback_body(),
            skip_waiting: true,
            claim_clients: true,
        }
    }

    /// Parse an origin string and build a default configuration.
    pub fn for_origin(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| ServiceWorkerError::ConfigError(format!("invalid origin: {}", e)))?;
        let config = Self::new(origin);
        config.validate()?;
        Ok(config)
    }

    /// Use the bucket name for a specific cache version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.cache_name = cache_name_for_version(version);
        self
    }

    /// Use an explicit bucket name.
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replace the precache list.
    pub fn with_precache_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Load from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ServiceWorkerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ServiceWorkerError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(ServiceWorkerError::ConfigError(
                "cache_name must not be empty".to_string(),
            ));
        }
        if !matches!(self.origin.scheme(), "http" | "https") || self.origin.host().is_none() {
            return Err(ServiceWorkerError::ConfigError(format!(
                "origin must be an http(s) URL with a host, got {}",
                self.origin
            )));
        }
        self.precache_request_urls()?;
        self.click_target()?;
        Ok(())
    }

    /// Resolve a path against the origin, rejecting other origins.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| ServiceWorkerError::ConfigError(format!("{}: {}", path, e)))?;
        if !self.is_same_origin(&url) {
            return Err(ServiceWorkerError::ConfigError(format!(
                "{} is not same-origin with {}",
                url,
                self.origin.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    /// Absolute URLs of the precache list.
    pub fn precache_request_urls(&self) -> Result<Vec<Url>> {
        self.precache_urls.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL opened on notification click.
    pub fn click_target(&self) -> Result<Url> {
        self.resolve(&self.click_route)
    }

    /// Check whether a URL belongs to the worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}
