//! Per-request cache strategy and generation bookkeeping.
//!
//! Strategy by resource class:
//! - API paths: network-first, dynamic-partition copy on success
//! - static assets (by extension): cache-first, static-partition copy
//! - navigations: network-first, offline page as the last resort
//! - everything else (GET): cache-first, dynamic-partition copy
//!
//! Every intercepted GET resolves to a [`Response`]; network errors are
//! converted into fallbacks, never propagated.

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchedResponse};
use crate::generation::{Generation, GenerationPhase};
use crate::offline;
use crate::store::{CacheStore, StoredResponse};

const API_ROOT: &str = "/api/";

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "eot",
];

/// Where a response came from, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// The response handed back to the requesting page.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    fn from_network(fetched: FetchedResponse) -> Self {
        Self {
            status: fetched.status,
            headers: fetched.headers,
            body: fetched.body,
            source: ResponseSource::Network,
        }
    }

    fn from_cache(stored: StoredResponse) -> Self {
        Self {
            status: stored.status,
            headers: stored.headers,
            body: stored.body,
            source: ResponseSource::Cache,
        }
    }
}

/// Request classification driving the cache strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Non-GET or non-http(s): not intercepted at all.
    PassThrough,
    Api,
    StaticAsset,
    Navigation,
    Other,
}

pub fn classify(request: &FetchRequest) -> ResourceClass {
    if !request.is_get() || !matches!(request.url.scheme(), "http" | "https") {
        return ResourceClass::PassThrough;
    }
    if request.url.path().starts_with(API_ROOT) {
        return ResourceClass::Api;
    }
    if is_static_asset(request) {
        return ResourceClass::StaticAsset;
    }
    if request.navigation {
        return ResourceClass::Navigation;
    }
    ResourceClass::Other
}

fn is_static_asset(request: &FetchRequest) -> bool {
    let path = request.url.path();
    match path.rsplit_once('.') {
        Some((_, ext)) => STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Owns the partitions and generation lifecycle for intercepted fetches.
///
/// The [`worker`](crate::worker) task is the sole owner of one controller;
/// pages reach it only through worker commands.
pub struct CacheController {
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetch>,
    active: Option<Generation>,
    incoming: Option<Generation>,
}

impl CacheController {
    pub fn new(store: Arc<CacheStore>, fetcher: Arc<dyn Fetch>) -> Self {
        let active = store.active_version().map(Generation::resumed_active);
        Self {
            store,
            fetcher,
            active,
            incoming: None,
        }
    }

    pub fn active_version(&self) -> Option<String> {
        self.active.as_ref().map(|g| g.version().to_string())
    }

    pub fn incoming_version(&self) -> Option<String> {
        self.incoming.as_ref().map(|g| g.version().to_string())
    }

    /// Pre-populate the incoming generation's static partition with the app
    /// shell. All-or-nothing: if any resource fails to fetch, the install
    /// fails and no partition rows are written.
    pub async fn install(
        &mut self,
        mut generation: Generation,
        resources: &[String],
        base: &url::Url,
    ) -> Result<()> {
        let mut entries = Vec::with_capacity(resources.len());
        for resource in resources {
            let url = base.join(resource)?;
            let request = FetchRequest::get(url);
            match self.fetcher.fetch(&request).await {
                Ok(fetched) if fetched.is_success() => {
                    entries.push((request.cache_key(), to_stored(&fetched)));
                }
                Ok(fetched) => {
                    bail!(
                        "shell resource {resource} returned status {}",
                        fetched.status
                    );
                }
                Err(e) => bail!("shell resource {resource} unfetchable: {e}"),
            }
        }

        self.store
            .put_all(&generation.static_partition(), &entries)?;
        generation.mark_installed();
        info!(
            version = generation.version(),
            resources = entries.len(),
            "generation installed"
        );
        self.incoming = Some(generation);
        Ok(())
    }

    /// Promote the incoming generation: delete every partition that is not
    /// one of its own, record it active, and supersede the previous one.
    pub fn activate(&mut self) -> Result<()> {
        let Some(mut generation) = self.incoming.take() else {
            bail!("no installed generation waiting for activation");
        };
        generation.mark_activating();

        let keep = vec![
            generation.static_partition(),
            generation.dynamic_partition(),
        ];
        let removed = self.store.delete_partitions_except(&keep)?;
        for name in &removed {
            debug!(partition = %name, "deleted stale partition");
        }

        self.store.set_active_version(generation.version())?;
        generation.mark_active();
        info!(version = generation.version(), "generation active");

        if let Some(previous) = self.active.as_mut() {
            previous.mark_superseded();
        }
        self.active = Some(generation);
        Ok(())
    }

    pub fn has_waiting(&self) -> bool {
        self.incoming
            .as_ref()
            .is_some_and(|g| g.phase() == GenerationPhase::Installed)
    }

    /// Resolve one intercepted request.
    ///
    /// Only the pass-through class can return `Err` (its network errors
    /// propagate untouched); every intercepted GET resolves to a response.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<Response, FetchError> {
        match classify(request) {
            ResourceClass::PassThrough => {
                self.fetcher.fetch(request).await.map(Response::from_network)
            }
            ResourceClass::Api => Ok(self.network_first_api(request).await),
            ResourceClass::StaticAsset => Ok(self.cache_first(request, true).await),
            ResourceClass::Navigation => Ok(self.network_first_navigation(request).await),
            ResourceClass::Other => Ok(self.cache_first(request, false).await),
        }
    }

    async fn network_first_api(&self, request: &FetchRequest) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(fetched) => {
                if fetched.is_success() {
                    self.store_copy(&self.dynamic_partition(), request, &fetched);
                }
                Response::from_network(fetched)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed for API request, trying cache");
                match self.store.lookup(&request.cache_key()) {
                    Some(stored) => Response::from_cache(stored),
                    None => offline::api_offline_response(),
                }
            }
        }
    }

    async fn network_first_navigation(&self, request: &FetchRequest) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(fetched) => Response::from_network(fetched),
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed for navigation, trying cache");
                match self.store.lookup(&request.cache_key()) {
                    Some(stored) => Response::from_cache(stored),
                    None => offline::navigation_offline_response(),
                }
            }
        }
    }

    async fn cache_first(&self, request: &FetchRequest, static_asset: bool) -> Response {
        if let Some(stored) = self.store.lookup(&request.cache_key()) {
            return Response::from_cache(stored);
        }
        match self.fetcher.fetch(request).await {
            Ok(fetched) => {
                if fetched.is_success() {
                    let partition = if static_asset {
                        self.static_partition()
                    } else {
                        self.dynamic_partition()
                    };
                    self.store_copy(&partition, request, &fetched);
                }
                Response::from_network(fetched)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed with no cached copy");
                if static_asset {
                    offline::asset_offline_response()
                } else {
                    offline::generic_offline_response()
                }
            }
        }
    }

    fn store_copy(&self, partition: &str, request: &FetchRequest, fetched: &FetchedResponse) {
        if let Err(e) = self
            .store
            .put(partition, &request.cache_key(), &to_stored(fetched))
        {
            warn!(url = %request.url, error = %e, "failed to cache response copy");
        }
    }

    /// Partition names come from the active generation, falling back to the
    /// incoming one before first activation.
    fn serving_generation(&self) -> Option<&Generation> {
        self.active.as_ref().or(self.incoming.as_ref())
    }

    fn static_partition(&self) -> String {
        self.serving_generation()
            .map(|g| g.static_partition())
            .unwrap_or_else(|| "snackshop-static-unversioned".into())
    }

    fn dynamic_partition(&self) -> String {
        self.serving_generation()
            .map(|g| g.dynamic_partition())
            .unwrap_or_else(|| "snackshop-dynamic-unversioned".into())
    }
}

fn to_stored(fetched: &FetchedResponse) -> StoredResponse {
    StoredResponse {
        status: fetched.status,
        headers: fetched.headers.clone(),
        body: fetched.body.clone(),
        stored_at: now_ms(),
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
