//! In-process host implementation.
//!
//! Backs the host traits with plain collections so the worker can run
//! outside a browser. Each piece has switches to inject the failures the
//! worker must survive.

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::host::{
    CacheEntry, CacheStorage, Client, ClientMatchOptions, ClientType, ClientsApi, FetchRequest,
    FetchResponse, Host, Network, NotificationHost, NotificationId, NotificationRequest,
    Registration, VisibilityState,
};
use crate::{Result, ServiceWorkerError};

// ==================== Cache ====================

/// A cache bucket.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Add entry.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
    fail_reads: AtomicBool,
    fail_keys: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every lookup fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make bucket enumeration fail.
    pub fn set_fail_keys(&self, fail: bool) {
        self.fail_keys.store(fail, Ordering::SeqCst);
    }

    /// Make every bucket deletion fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Create a bucket holding the given entries.
    pub async fn seed(&self, name: &str, entries: Vec<CacheEntry>) {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        for entry in entries {
            cache.put(entry);
        }
    }

    /// Check if a bucket exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Snapshot of one bucket.
    pub async fn bucket(&self, name: &str) -> Option<Cache> {
        self.caches.read().await.get(name).cloned()
    }

    /// Sorted bucket names.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .get_mut(name)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("cache {}", name)))?;
        for entry in entries {
            cache.put(entry);
        }
        Ok(())
    }

    async fn match_request(&self, name: &str, url: &str) -> Result<Option<CacheEntry>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::CacheError(format!(
                "cache {} is unavailable",
                name
            )));
        }
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .and_then(|cache| cache.match_request(url))
            .cloned())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        if self.fail_keys.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::CacheError(
                "cache enumeration failed".to_string(),
            ));
        }
        Ok(self.names().await)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::CacheError(format!(
                "failed to delete cache {}",
                name
            )));
        }
        Ok(self.caches.write().await.remove(name).is_some())
    }
}

// ==================== Network ====================

/// Network that serves a fixed set of resources.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    resources: RwLock<HashMap<String, FetchResponse>>,
    requests: RwLock<Vec<String>>,
    offline: AtomicBool,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a response for a URL.
    pub async fn serve(&self, url: &str, response: FetchResponse) {
        self.resources.write().await.insert(url.to_string(), response);
    }

    /// Serve a 200 response with the given body.
    pub async fn serve_ok(&self, url: &str, body: &str) {
        self.serve(url, FetchResponse::new(200, body)).await;
    }

    /// Fail every request as if the device were offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// URLs requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.to_string();
        self.requests.write().await.push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::NetworkError(format!(
                "failed to fetch {}",
                url
            )));
        }

        let resources = self.resources.read().await;
        Ok(resources
            .get(&url)
            .cloned()
            .unwrap_or_else(|| FetchResponse::new(404, Vec::new())))
    }
}

// ==================== Clients ====================

/// Clients held in creation order.
#[derive(Debug, Default)]
pub struct MemoryClients {
    clients: RwLock<Vec<Client>>,
    inbox: RwLock<Vec<(String, String)>>,
    unreachable: RwLock<HashSet<String>>,
    fail_match_all: AtomicBool,
    fail_focus: AtomicBool,
    fail_open_window: AtomicBool,
    fail_claim: AtomicBool,
    claimed: AtomicBool,
    next_id: AtomicU64,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub async fn add(&self, client: Client) {
        self.clients.write().await.push(client);
    }

    /// Add a window client at a URL and return its ID.
    pub async fn add_window(&self, url: &str) -> Result<String> {
        let url = Url::parse(url).map_err(|e| ServiceWorkerError::ClientsError(e.to_string()))?;
        let id = self.allocate_id();
        self.add(Client::window(id.clone(), url)).await;
        Ok(id)
    }

    /// Make message delivery to one client fail.
    pub async fn set_unreachable(&self, client_id: &str) {
        self.unreachable.write().await.insert(client_id.to_string());
    }

    /// Make client enumeration fail.
    pub fn set_fail_match_all(&self, fail: bool) {
        self.fail_match_all.store(fail, Ordering::SeqCst);
    }

    /// Make focusing a window fail.
    pub fn set_fail_focus(&self, fail: bool) {
        self.fail_focus.store(fail, Ordering::SeqCst);
    }

    /// Make opening a window fail.
    pub fn set_fail_open_window(&self, fail: bool) {
        self.fail_open_window.store(fail, Ordering::SeqCst);
    }

    /// Make claiming clients fail.
    pub fn set_fail_claim(&self, fail: bool) {
        self.fail_claim.store(fail, Ordering::SeqCst);
    }

    /// Messages delivered so far as (client ID, message).
    pub async fn delivered(&self) -> Vec<(String, String)> {
        self.inbox.read().await.clone()
    }

    /// Messages delivered to one client.
    pub async fn delivered_to(&self, client_id: &str) -> Vec<String> {
        self.inbox
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == client_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Snapshot of every client.
    pub async fn all(&self) -> Vec<Client> {
        self.clients.read().await.clone()
    }

    /// Whether `claim` has been called.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl ClientsApi for MemoryClients {
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>> {
        if self.fail_match_all.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::ClientsError(
                "client enumeration failed".to_string(),
            ));
        }
        Ok(self
            .clients
            .read()
            .await
            .iter()
            .filter(|c| options.accepts(c))
            .cloned()
            .collect())
    }

    async fn post_message(&self, client_id: &str, message: &str) -> Result<()> {
        if self.unreachable.read().await.contains(client_id) {
            return Err(ServiceWorkerError::ClientsError(format!(
                "client {} is unreachable",
                client_id
            )));
        }
        if !self.clients.read().await.iter().any(|c| c.id == client_id) {
            return Err(ServiceWorkerError::NotFound(format!("client {}", client_id)));
        }
        self.inbox
            .write()
            .await
            .push((client_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn focus(&self, client_id: &str) -> Result<Client> {
        if self.fail_focus.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::ClientsError(format!(
                "failed to focus client {}",
                client_id
            )));
        }
        let mut clients = self.clients.write().await;
        let index = clients
            .iter()
            .position(|c| c.id == client_id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", client_id)))?;
        if clients[index].client_type != ClientType::Window {
            return Err(ServiceWorkerError::ClientsError(
                "Can only focus window clients".to_string(),
            ));
        }

        for (i, client) in clients.iter_mut().enumerate() {
            client.focused = i == index;
        }
        let client = &mut clients[index];
        client.visibility_state = VisibilityState::Visible;
        Ok(client.clone())
    }

    async fn open_window(&self, url: &Url) -> Result<Client> {
        if self.fail_open_window.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::ClientsError(format!(
                "failed to open window at {}",
                url
            )));
        }
        let mut client = Client::window(self.allocate_id(), url.clone());
        client.focused = true;
        let mut clients = self.clients.write().await;
        for other in clients.iter_mut() {
            other.focused = false;
        }
        clients.push(client.clone());
        Ok(client)
    }

    async fn claim(&self) -> Result<()> {
        if self.fail_claim.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::ClientsError(
                "failed to claim clients".to_string(),
            ));
        }
        for client in self.clients.write().await.iter_mut() {
            client.controlled = true;
        }
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ==================== Notifications ====================

/// Notification tray held in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifications {
    attempts: RwLock<Vec<NotificationRequest>>,
    shown: RwLock<Vec<(NotificationId, NotificationRequest)>>,
    closed: RwLock<Vec<NotificationId>>,
    failures_remaining: AtomicUsize,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` render calls.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every render request, including failed ones.
    pub async fn attempts(&self) -> Vec<NotificationRequest> {
        self.attempts.read().await.clone()
    }

    /// Notifications currently displayed.
    pub async fn shown(&self) -> Vec<(NotificationId, NotificationRequest)> {
        self.shown.read().await.clone()
    }

    /// Notifications dismissed so far.
    pub async fn closed(&self) -> Vec<NotificationId> {
        self.closed.read().await.clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NotificationHost for MemoryNotifications {
    async fn show_notification(&self, request: &NotificationRequest) -> Result<NotificationId> {
        self.attempts.write().await.push(request.clone());
        if self.take_failure() {
            return Err(ServiceWorkerError::NotificationError(
                "notification permission denied".to_string(),
            ));
        }
        let id = NotificationId::next();
        self.shown.write().await.push((id, request.clone()));
        Ok(id)
    }

    async fn close_notification(&self, id: NotificationId) -> Result<()> {
        let mut shown = self.shown.write().await;
        let before = shown.len();
        shown.retain(|(shown_id, _)| *shown_id != id);
        if shown.len() == before {
            return Err(ServiceWorkerError::NotFound(format!(
                "notification {}",
                id.as_u64()
            )));
        }
        self.closed.write().await.push(id);
        Ok(())
    }
}

// ==================== Registration ====================

/// Registration that records `skipWaiting` calls.
#[derive(Debug, Default)]
pub struct MemoryRegistration {
    skipped_waiting: AtomicBool,
    fail_skip_waiting: AtomicBool,
}

impl MemoryRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `skipWaiting` fail.
    pub fn set_fail_skip_waiting(&self, fail: bool) {
        self.fail_skip_waiting.store(fail, Ordering::SeqCst);
    }

    pub fn skipped_waiting(&self) -> bool {
        self.skipped_waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registration for MemoryRegistration {
    async fn skip_waiting(&self) -> Result<()> {
        if self.fail_skip_waiting.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::ClientsError(
                "skipWaiting rejected".to_string(),
            ));
        }
        self.skipped_waiting.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ==================== Host ====================

/// Every in-memory host API, with typed handles kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    pub caches: Arc<MemoryCacheStorage>,
    pub network: Arc<MemoryNetwork>,
    pub clients: Arc<MemoryClients>,
    pub notifications: Arc<MemoryNotifications>,
    pub registration: Arc<MemoryRegistration>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased view handed to the worker.
    pub fn host(&self) -> Host {
        Host {
            caches: self.caches.clone(),
            network: self.network.clone(),
            clients: self.clients.clone(),
            notifications: self.notifications.clone(),
            registration: self.registration.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
            cached_at: 0,
        }
    }

    #[tokio::test]
    async fn test_cache_storage() {
        let storage = MemoryCacheStorage::new();
        assert!(!storage.has("v1").await);

        storage.open("v1").await.unwrap();
        assert!(storage.has("v1").await);

        storage
            .put_all("v1", vec![entry("https://example.com/style.css")])
            .await
            .unwrap();
        assert!(storage
            .match_request("v1", "https://example.com/style.css")
            .await
            .unwrap()
            .is_some());
        assert!(storage
            .match_request("v2", "https://example.com/style.css")
            .await
            .unwrap()
            .is_none());

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.has("v1").await);
    }

    #[tokio::test]
    async fn test_put_all_requires_open_bucket() {
        let storage = MemoryCacheStorage::new();
        let result = storage.put_all("missing", vec![entry("https://example.com/")]).await;
        assert!(matches!(result, Err(ServiceWorkerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_network_records_requests() {
        let network = MemoryNetwork::new();
        network.serve_ok("https://example.com/", "<html>").await;

        let ok = network
            .fetch(&FetchRequest::get(Url::parse("https://example.com/").unwrap()))
            .await
            .unwrap();
        assert!(ok.is_ok());

        let missing = network
            .fetch(&FetchRequest::get(Url::parse("https://example.com/nope").unwrap()))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(network.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_clients_open_and_focus() {
        let clients = MemoryClients::new();
        let first = clients.add_window("https://example.com/").await.unwrap();

        let opened = clients
            .open_window(&Url::parse("https://example.com/notifications").unwrap())
            .await
            .unwrap();
        assert!(opened.focused);

        let focused = clients.focus(&first).await.unwrap();
        assert!(focused.focused);
        let all = clients.all().await;
        assert_eq!(all.iter().filter(|c| c.focused).count(), 1);
    }

    #[tokio::test]
    async fn test_client_failure_switches() {
        let clients = MemoryClients::new();
        let id = clients.add_window("https://example.com/").await.unwrap();
        clients.set_fail_focus(true);
        clients.set_fail_open_window(true);
        clients.set_fail_claim(true);

        assert!(clients.focus(&id).await.is_err());
        assert!(clients
            .open_window(&Url::parse("https://example.com/notifications").unwrap())
            .await
            .is_err());
        assert!(clients.claim().await.is_err());
        assert!(!clients.is_claimed());
        assert_eq!(clients.all().await.len(), 1);
        assert!(!clients.all().await[0].focused);
    }

    #[tokio::test]
    async fn test_storage_and_registration_failure_switches() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        storage.set_fail_keys(true);
        assert!(matches!(
            storage.keys().await,
            Err(ServiceWorkerError::CacheError(_))
        ));

        let registration = MemoryRegistration::new();
        registration.set_fail_skip_waiting(true);
        assert!(registration.skip_waiting().await.is_err());
        assert!(!registration.skipped_waiting());
    }

    #[tokio::test]
    async fn test_notifications_fail_next() {
        let notifications = MemoryNotifications::new();
        notifications.fail_next(1);

        let request = NotificationRequest {
            title: "t".to_string(),
            options: crate::host::NotificationOptions {
                body: "b".to_string(),
                icon: "/i.png".to_string(),
                badge: None,
                data: serde_json::json!({}),
                require_interaction: false,
            },
        };
        assert!(notifications.show_notification(&request).await.is_err());
        let id = notifications.show_notification(&request).await.unwrap();
        assert_eq!(notifications.attempts().await.len(), 2);

        notifications.close_notification(id).await.unwrap();
        assert!(notifications.shown().await.is_empty());
        assert_eq!(notifications.closed().await, vec![id]);
    }
}
