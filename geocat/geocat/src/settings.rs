//! Client configuration.

use std::{fmt, sync::Arc, time::Duration};

use crate::cache::{Cache, MemoryCache};
use crate::error::Result;
use crate::network::{HttpNetwork, Network};
use crate::retry::RetrySettings;

/// Default lookup service base URL.
pub const DEFAULT_LOOKUP_URL: &str = "https://api-lookup.data.api.platform.here.com/lookup/v1";

/// How long a resolved endpoint stays fresh.
pub const DEFAULT_LOOKUP_TTL: Duration = Duration::from_secs(60 * 60);

/// Size cap of the default in-memory cache, in bytes.
pub const DEFAULT_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// Number of index queries and blob downloads a prefetch runs at once.
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 8;

/// Supplies bearer tokens for outgoing requests.
///
/// Acquiring and refreshing tokens is the implementor's business; the client
/// asks for a token before every request.
pub trait TokenProvider: Send + Sync {
    /// The current access token.
    fn token(&self) -> Result<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn token(&self) -> Result<String> {
        self()
    }
}

/// Settings shared by every request a client issues.
#[derive(Clone)]
pub struct ClientSettings {
    /// Base URL of the lookup service.
    pub lookup_url: String,
    /// Freshness window of resolved endpoints.
    pub lookup_ttl: Duration,
    /// Retry policy applied to every network call.
    pub retry: RetrySettings,
    /// Storage for metadata, payloads and endpoints.
    pub cache: Arc<dyn Cache>,
    /// Transport.
    pub network: Arc<dyn Network>,
    /// Source of bearer tokens, if requests need authorization.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// Concurrent sub-requests per prefetch.
    pub prefetch_concurrency: usize,
    /// Runtime to spawn callback-style requests on. Defaults to the runtime
    /// the client is created on.
    pub runtime: Option<tokio::runtime::Handle>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            lookup_ttl: DEFAULT_LOOKUP_TTL,
            retry: RetrySettings::default(),
            cache: Arc::new(MemoryCache::with_max_size(DEFAULT_CACHE_SIZE)),
            network: Arc::new(HttpNetwork::new()),
            token_provider: None,
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            runtime: None,
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("lookup_url", &self.lookup_url)
            .field("lookup_ttl", &self.lookup_ttl)
            .field("retry", &self.retry)
            .field("token_provider", &self.token_provider.is_some())
            .field("prefetch_concurrency", &self.prefetch_concurrency)
            .finish_non_exhaustive()
    }
}

impl ClientSettings {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lookup service base URL.
    #[must_use]
    pub fn with_lookup_url(mut self, lookup_url: impl Into<String>) -> Self {
        self.lookup_url = lookup_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the endpoint freshness window.
    #[must_use]
    pub fn with_lookup_ttl(mut self, lookup_ttl: Duration) -> Self {
        self.lookup_ttl = lookup_ttl;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Use a custom cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a custom transport.
    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = network;
        self
    }

    /// Authorize requests with tokens from `provider`.
    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Set prefetch concurrency. Zero behaves like one.
    #[must_use]
    pub fn with_prefetch_concurrency(mut self, concurrency: usize) -> Self {
        self.prefetch_concurrency = concurrency.max(1);
        self
    }

    /// Spawn callback-style requests on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}
