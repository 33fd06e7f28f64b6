//! Cache lifecycle: precache on install, prune on activate.

use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::host::{CacheStorage, ClientsApi, FetchRequest, Network, Registration};
use crate::relay::ClientLogRelay;
use crate::{Result, ServiceWorkerError};

/// Result of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale buckets removed.
    pub deleted: Vec<String>,
    /// Stale buckets that could not be removed.
    pub failed: Vec<String>,
    /// Whether open clients were claimed.
    pub claimed: bool,
}

/// Owns the versioned cache bucket.
#[derive(Clone)]
pub struct CacheLifecycle {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn ClientsApi>,
    registration: Arc<dyn Registration>,
    relay: ClientLogRelay,
}

impl CacheLifecycle {
    pub fn new(
        config: Arc<WorkerConfig>,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn ClientsApi>,
        registration: Arc<dyn Registration>,
        relay: ClientLogRelay,
    ) -> Self {
        Self {
            config,
            caches,
            network,
            clients,
            registration,
            relay,
        }
    }

    /// Handle the install event. Returns the number of precached assets.
    ///
    /// Precaching is all-or-nothing: if any listed resource cannot be
    /// fetched, nothing is written and the install fails.
    pub async fn install(&self) -> Result<usize> {
        let cache = self.config.cache_name.as_str();
        self.relay
            .info("Service worker installing", Some(json!({ "cache": cache })))
            .await;

        match self.precache().await {
            Ok(count) => {
                self.relay
                    .success(
                        "Precached app shell",
                        Some(json!({ "cache": cache, "assets": count })),
                    )
                    .await;
                if self.config.skip_waiting {
                    if let Err(e) = self.registration.skip_waiting().await {
                        self.relay
                            .warning("skipWaiting failed", Some(json!({ "error": e.to_string() })))
                            .await;
                    }
                }
                Ok(count)
            }
            Err(e) => {
                self.relay
                    .error(
                        "Precache failed",
                        Some(json!({ "cache": cache, "error": e.to_string() })),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let urls = self.config.precache_request_urls()?;
        let cache = self.config.cache_name.as_str();
        self.caches.open(cache).await?;

        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let request = FetchRequest::get(url);
            let response = self.network.fetch(&request).await.map_err(|e| {
                ServiceWorkerError::PrecacheFailed {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if !response.is_ok() {
                return Err(ServiceWorkerError::PrecacheFailed {
                    url: request.url.to_string(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            debug!(url = %request.url, status = response.status, "Fetched precache asset");
            entries.push(response.to_cache_entry(&request));
        }

        let count = entries.len();
        self.caches.put_all(cache, entries).await?;
        Ok(count)
    }

    /// Handle the activate event: delete every bucket but the current one.
    pub async fn activate(&self) -> ActivationReport {
        let current = self.config.cache_name.as_str();
        let mut report = ActivationReport::default();

        match self.caches.keys().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| n != current) {
                    match self.caches.delete(&name).await {
                        Ok(_) => {
                            self.relay
                                .info("Deleted stale cache", Some(json!({ "cache": name })))
                                .await;
                            report.deleted.push(name);
                        }
                        Err(e) => {
                            self.relay
                                .error(
                                    "Failed to delete stale cache",
                                    Some(json!({ "cache": name, "error": e.to_string() })),
                                )
                                .await;
                            report.failed.push(name);
                        }
                    }
                }
            }
            Err(e) => {
                self.relay
                    .error(
                        "Failed to enumerate caches",
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await;
            }
        }

        if self.config.claim_clients {
            match self.clients.claim().await {
                Ok(()) => report.claimed = true,
                Err(e) => {
                    self.relay
                        .warning(
                            "Failed to claim clients",
                            Some(json!({ "error": e.to_string() })),
                        )
                        .await;
                }
            }
        }

        self.relay
            .success(
                "Service worker activated",
                Some(json!({ "cache": current, "deleted": report.deleted.len() })),
            )
            .await;
        report
    }
}
