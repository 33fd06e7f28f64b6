//! Host APIs the worker runs against.
//!
//! The browser provides cache storage, network access, client enumeration and
//! notification display. Each is an async trait so every call is an explicit
//! suspension point and tests can swap in [`crate::memory`] implementations.

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

use crate::Result;

// ==================== Cache ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// Cache storage (the `caches` global).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Write entries into a bucket in one batch.
    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<()>;

    /// Look up a request URL in one bucket.
    async fn match_request(&self, name: &str, url: &str) -> Result<Option<CacheEntry>>;

    /// Names of every bucket.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a bucket. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;
}

// ==================== Network ====================

/// An outgoing resource request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Is navigation request.
    pub is_navigation: bool,
}

impl FetchRequest {
    /// Create a plain GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: HashMap::new(),
            is_navigation: false,
        }
    }

    /// Create a navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            is_navigation: true,
            ..Self::get(url)
        }
    }
}

/// A response, either from the network or from cache.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether from cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a network response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    /// Create a response from cache entry.
    pub fn from_cache(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            status_text: status_text(entry.status).to_string(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Whether the status is 2xx.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Build the cache entry stored for this response.
    pub fn to_cache_entry(&self, request: &FetchRequest) -> CacheEntry {
        CacheEntry {
            url: request.url.to_string(),
            method: request.method.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            cached_at: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        304 => "Not Modified",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Network access.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform a request. Transport failures are `NetworkError`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

// ==================== Clients ====================

/// A client (an open app page or worker).
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Frame type.
    pub frame_type: FrameType,

    /// Visibility state.
    pub visibility_state: VisibilityState,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

impl Client {
    /// Create a visible top-level window client.
    pub fn window(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            client_type: ClientType::Window,
            frame_type: FrameType::TopLevel,
            visibility_state: VisibilityState::Visible,
            focused: false,
            controlled: true,
        }
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// Frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Auxiliary,
    TopLevel,
    Nested,
    None,
}

/// Visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Hidden,
    Visible,
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

impl ClientMatchOptions {
    /// Every client, controlled or not.
    pub fn everyone() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::All,
        }
    }

    /// Every window client, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        }
    }

    /// Check whether a client passes these options.
    pub fn accepts(&self, client: &Client) -> bool {
        if !self.include_uncontrolled && !client.controlled {
            return false;
        }
        match self.client_type {
            ClientType::All => true,
            t => client.client_type == t,
        }
    }
}

/// Clients API.
#[async_trait]
pub trait ClientsApi: Send + Sync {
    /// Enumerate clients, in host order.
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>>;

    /// Post a serialized message to one client.
    async fn post_message(&self, client_id: &str, message: &str) -> Result<()>;

    /// Focus a window client.
    async fn focus(&self, client_id: &str) -> Result<Client>;

    /// Open a new window.
    async fn open_window(&self, url: &Url) -> Result<Client>;

    /// Take control of every in-scope client.
    async fn claim(&self) -> Result<()>;
}

// ==================== Notifications ====================

/// Identifier of a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Options passed to `showNotification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,

    pub icon: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,

    /// Data handed back on click.
    pub data: JsonValue,

    /// Keep the notification until the user dismisses it.
    pub require_interaction: bool,
}

/// A full render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub options: NotificationOptions,
}

/// Notification display.
#[async_trait]
pub trait NotificationHost: Send + Sync {
    /// Display a notification.
    async fn show_notification(&self, request: &NotificationRequest) -> Result<NotificationId>;

    /// Dismiss a displayed notification.
    async fn close_notification(&self, id: NotificationId) -> Result<()>;
}

// ==================== Registration ====================

/// The worker's own registration.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Activate without waiting for old clients to close.
    async fn skip_waiting(&self) -> Result<()>;
}

// ==================== Host ====================

/// Every host API, as handed to the worker at startup.
#[derive(Clone)]
pub struct Host {
    pub caches: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub clients: Arc<dyn ClientsApi>,
    pub notifications: Arc<dyn NotificationHost>,
    pub registration: Arc<dyn Registration>,
}
