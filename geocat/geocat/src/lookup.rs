//! Endpoint resolution.
//!
//! Services of a catalog are not addressed directly: the lookup service maps
//! a resource name to the base URL of each api it exposes. Resolved
//! endpoints are cached in the [`CacheScope::Endpoint`] scope for the
//! configured TTL.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use geocat_model::{Apis, Hrn};
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheScope};
use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::keys;
use crate::service::ServiceClient;

/// Apis resolved through the platform lookup rather than per resource.
const PLATFORM_APIS: [&str; 1] = ["config"];

/// A resolved service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// Api name, e.g. `metadata`.
    pub api: String,
    /// Api version, e.g. `v1`.
    pub version: String,
    /// Base URL requests for this api are issued against.
    pub base_url: String,
    /// When the entry was resolved, in seconds since the Unix epoch.
    pub resolved_at: u64,
}

impl EndpointEntry {
    /// Whether the entry is still usable at `now` under `ttl`.
    #[must_use]
    pub fn is_fresh(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.resolved_at) < ttl.as_secs()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Resolves and caches service endpoints.
pub(crate) struct ApiLookup {
    lookup_url: String,
    ttl: Duration,
    cache: Arc<dyn Cache>,
    service: Arc<ServiceClient>,
}

impl ApiLookup {
    pub(crate) fn new(
        lookup_url: String,
        ttl: Duration,
        cache: Arc<dyn Cache>,
        service: Arc<ServiceClient>,
    ) -> Self {
        Self {
            lookup_url,
            ttl,
            cache,
            service,
        }
    }

    /// Resolve the endpoint of `api` at `version` for `hrn`.
    pub(crate) async fn resolve(
        &self,
        hrn: &Hrn,
        api: &str,
        version: &str,
        context: &CancellationContext,
    ) -> Result<EndpointEntry> {
        let key = keys::endpoint(hrn, api, version);
        if let Some(entry) = self.cached(&key) {
            tracing::debug!(key, base_url = entry.base_url, "endpoint cache hit");
            return Ok(entry);
        }

        let url = if PLATFORM_APIS.contains(&api) {
            format!("{}/platform/apis/{api}/{version}", self.lookup_url)
        } else {
            format!("{}/resources/{hrn}/apis", self.lookup_url)
        };
        tracing::debug!(url, api, version, "resolving endpoint");

        let body = self.service.get(&url, context).await?;
        let apis: Apis = geocat_model::from_json("lookup", &body)?;

        let resolved_at = unix_now();
        let mut found = None;
        for api_entry in apis {
            let entry = EndpointEntry {
                api: api_entry.api,
                version: api_entry.version,
                base_url: api_entry.base_url.trim_end_matches('/').to_string(),
                resolved_at,
            };
            self.store(hrn, &entry);
            if entry.api == api && entry.version == version {
                found = Some(entry);
            }
        }

        found.ok_or_else(|| {
            Error::not_found(format!("api {api} {version} is not offered for {hrn}"))
        })
    }

    /// Drop a resolved endpoint so the next call resolves it again.
    pub(crate) fn invalidate(&self, hrn: &Hrn, api: &str, version: &str) {
        let key = keys::endpoint(hrn, api, version);
        if let Err(e) = self.cache.remove(&key) {
            tracing::warn!(key, error = %e, "failed to invalidate endpoint");
        }
    }

    fn cached(&self, key: &str) -> Option<EndpointEntry> {
        let bytes = match self.cache.get(key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                tracing::warn!(key, error = %e, "endpoint cache read failed");
                return None;
            }
        };
        let entry: EndpointEntry = serde_json::from_slice(&bytes).ok()?;
        entry.is_fresh(unix_now(), self.ttl).then_some(entry)
    }

    fn store(&self, hrn: &Hrn, entry: &EndpointEntry) {
        let key = keys::endpoint(hrn, &entry.api, &entry.version);
        let stored = serde_json::to_vec(entry)
            .map_err(|e| Error::Cache {
                operation: "encode",
                message: e.to_string(),
            })
            .and_then(|bytes| {
                self.cache
                    .put(&key, bytes, CacheScope::Endpoint, Some(self.ttl))
            });
        if let Err(e) = stored {
            tracing::warn!(key, error = %e, "failed to cache endpoint");
        }
    }
}
