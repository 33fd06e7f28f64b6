//! Fetch interception: cache first, network on miss.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::host::{CacheStorage, FetchRequest, FetchResponse, Network};
use crate::Result;

/// Serves requests from the current cache bucket.
#[derive(Clone)]
pub struct FetchInterceptor {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl FetchInterceptor {
    pub fn new(
        config: Arc<WorkerConfig>,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config,
            caches,
            network,
        }
    }

    /// Handle a fetch event.
    ///
    /// A cached response is returned as stored, without revalidation. On a
    /// miss the request goes to the network and its failure is the request's
    /// failure. Only GET requests are looked up in the cache.
    pub async fn handle(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.as_str();

        if !request.method.eq_ignore_ascii_case("GET") {
            debug!(url, method = %request.method, "Bypassing cache");
            return self.network.fetch(request).await;
        }

        match self.caches.match_request(&self.config.cache_name, url).await {
            Ok(Some(entry)) => {
                debug!(url, "Serving from cache");
                return Ok(FetchResponse::from_cache(&entry));
            }
            Ok(None) => debug!(url, "Cache miss"),
            Err(e) => warn!(url, error = %e, "Cache lookup failed, falling back to network"),
        }

        self.network.fetch(request).await
    }
}
