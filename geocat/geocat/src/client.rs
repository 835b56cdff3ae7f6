//! The public catalog client.
//!
//! Every read comes in two forms: an `async fn fetch_*` to await directly,
//! and a `get_*` that returns a [`CancellationToken`] at once and delivers
//! the result to a callback from a runtime task. The callback is invoked
//! exactly once, with [`Error::Cancelled`] when the token cancelled the
//! chain before it completed.

use std::{future::Future, sync::Arc};

use geocat_model::{Catalog, Hrn, Partitions};

use crate::cancellation::{CancellationContext, CancellationToken};
use crate::data;
use crate::error::{Error, Result};
use crate::keys;
use crate::metadata::Repository;
use crate::policy::FetchOption;
use crate::prefetch;
use crate::runtime::TaskSpawner;
use crate::settings::ClientSettings;
use crate::types::{
    CatalogRequest, CatalogVersionRequest, DataRequest, PartitionsRequest, PrefetchRequest,
    PrefetchTileResult,
};

/// Read client for one catalog.
///
/// Cloning is cheap; clones share the cache, transport and endpoint
/// resolution.
///
/// # Example
///
/// ```ignore
/// use geocat::{CatalogClient, ClientSettings, Hrn, PartitionsRequest};
///
/// let hrn = Hrn::parse("hrn:here:data:::example-catalog")?;
/// let client = CatalogClient::new(hrn, ClientSettings::default())?;
///
/// let partitions = client
///     .fetch_partitions(PartitionsRequest::new("roads"))
///     .await?;
/// ```
#[derive(Clone)]
pub struct CatalogClient {
    repository: Arc<Repository>,
    spawner: TaskSpawner,
    prefetch_concurrency: usize,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("hrn", self.repository.hrn())
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a client for the catalog `hrn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `hrn` does not name a data
    /// catalog, or if no runtime is configured and the caller is not running
    /// on a Tokio runtime.
    pub fn new(hrn: Hrn, settings: ClientSettings) -> Result<Self> {
        if !hrn.is_catalog() {
            return Err(Error::invalid_argument(format!(
                "{hrn} does not name a data catalog"
            )));
        }
        let spawner = match settings.runtime.clone() {
            Some(handle) => TaskSpawner::from_handle(handle),
            None => TaskSpawner::current()?,
        };
        Ok(Self {
            repository: Arc::new(Repository::new(hrn, &settings)),
            spawner,
            prefetch_concurrency: settings.prefetch_concurrency.max(1),
        })
    }

    /// The catalog this client reads.
    #[must_use]
    pub fn hrn(&self) -> &Hrn {
        self.repository.hrn()
    }

    /// Fetch the catalog configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is neither cached (as the fetch
    /// option requires) nor retrievable.
    pub async fn fetch_catalog(&self, request: CatalogRequest) -> Result<Catalog> {
        self.catalog(request, &CancellationContext::new()).await
    }

    /// Fetch the catalog configuration, delivering it to `callback`.
    pub fn get_catalog<F>(&self, request: CatalogRequest, callback: F) -> CancellationToken
    where
        F: FnOnce(Result<Catalog>) + Send + 'static,
    {
        self.spawn_with_callback(callback, move |client, context| async move {
            client.catalog(request, &context).await
        })
    }

    /// Fetch the latest catalog version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is neither cached (as the fetch option
    /// requires) nor retrievable.
    pub async fn fetch_latest_version(&self, request: CatalogVersionRequest) -> Result<i64> {
        self.latest_version(request, &CancellationContext::new()).await
    }

    /// Fetch the latest catalog version, delivering it to `callback`.
    pub fn get_latest_version<F>(
        &self,
        request: CatalogVersionRequest,
        callback: F,
    ) -> CancellationToken
    where
        F: FnOnce(Result<i64>) + Send + 'static,
    {
        self.spawn_with_callback(callback, move |client, context| async move {
            client.latest_version(request, &context).await
        })
    }

    /// Fetch the partition list of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown layer or one without
    /// a partition list, and any error of the resolution chain.
    pub async fn fetch_partitions(&self, request: PartitionsRequest) -> Result<Partitions> {
        self.partitions(request, &CancellationContext::new()).await
    }

    /// Fetch the partition list of a layer, delivering it to `callback`.
    pub fn get_partitions<F>(&self, request: PartitionsRequest, callback: F) -> CancellationToken
    where
        F: FnOnce(Result<Partitions>) + Send + 'static,
    {
        self.spawn_with_callback(callback, move |client, context| async move {
            client.partitions(request, &context).await
        })
    }

    /// Fetch the payload of a partition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown layer, one without
    /// partitions, or a request naming neither partition nor data handle,
    /// and any error of the resolution chain.
    pub async fn fetch_data(&self, request: DataRequest) -> Result<Vec<u8>> {
        self.data(request, &CancellationContext::new()).await
    }

    /// Fetch the payload of a partition, delivering it to `callback`.
    pub fn get_data<F>(&self, request: DataRequest, callback: F) -> CancellationToken
    where
        F: FnOnce(Result<Vec<u8>>) + Send + 'static,
    {
        self.spawn_with_callback(callback, move |client, context| async move {
            client.data(request, &context).await
        })
    }

    /// Download the tiles around a set of tile keys into the cache.
    ///
    /// Returns one result per requested key, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an invalid level range or a
    /// request too large to plan, and any error resolving the layer or its
    /// version. Failures of individual tiles are reported per key instead.
    pub async fn prefetch(&self, request: PrefetchRequest) -> Result<Vec<PrefetchTileResult>> {
        prefetch::prefetch(
            Arc::clone(&self.repository),
            request,
            self.prefetch_concurrency,
            CancellationContext::new(),
        )
        .await
    }

    /// Download the tiles around a set of tile keys into the cache,
    /// delivering the per-key results to `callback`.
    ///
    /// Cancelling stops every pending index query and download; tiles that
    /// completed are still reported.
    pub fn prefetch_tiles<F>(&self, request: PrefetchRequest, callback: F) -> CancellationToken
    where
        F: FnOnce(Result<Vec<PrefetchTileResult>>) + Send + 'static,
    {
        self.spawn_with_callback(callback, move |client, context| {
            prefetch::prefetch(
                Arc::clone(&client.repository),
                request,
                client.prefetch_concurrency,
                context,
            )
        })
    }

    /// Base URL of the stream service for a stream layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the layer is not a stream layer,
    /// and any error resolving the endpoint.
    pub async fn stream_endpoint(&self, layer_id: &str) -> Result<String> {
        self.repository
            .stream_endpoint(layer_id, &CancellationContext::new())
            .await
    }

    /// Drop everything cached for a layer: partition lists, partition
    /// metadata, quadtree indexes and payloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `layer_id` is empty or contains
    /// `:`, or an error if the cache rejects the removal.
    pub fn remove_from_cache(&self, layer_id: &str) -> Result<()> {
        if !keys::is_layer_id(layer_id) {
            return Err(Error::invalid_argument(format!("{layer_id:?} is not a layer id")));
        }
        let prefix = keys::layer_prefix(self.repository.hrn(), layer_id);
        tracing::debug!(prefix, "removing layer from cache");
        self.repository.cache().remove_prefix(&prefix)
    }

    async fn catalog(
        &self,
        request: CatalogRequest,
        context: &CancellationContext,
    ) -> Result<Catalog> {
        if request.fetch_option.refreshes_in_background() {
            self.refresh_in_background("catalog", |repository, context| async move {
                repository.catalog(FetchOption::OnlineOnly, &context).await
            });
        }
        self.repository.catalog(request.fetch_option, context).await
    }

    async fn latest_version(
        &self,
        request: CatalogVersionRequest,
        context: &CancellationContext,
    ) -> Result<i64> {
        if request.fetch_option.refreshes_in_background() {
            self.refresh_in_background("latest version", |repository, context| async move {
                repository
                    .latest_version(FetchOption::OnlineOnly, &context)
                    .await
            });
        }
        self.repository
            .latest_version(request.fetch_option, context)
            .await
    }

    async fn partitions(
        &self,
        request: PartitionsRequest,
        context: &CancellationContext,
    ) -> Result<Partitions> {
        if request.fetch_option.refreshes_in_background() {
            let refresh = request.clone();
            self.refresh_in_background("partitions", |repository, context| async move {
                repository
                    .partitions(
                        &refresh.layer_id,
                        refresh.version,
                        FetchOption::OnlineOnly,
                        &context,
                    )
                    .await
            });
        }
        self.repository
            .partitions(
                &request.layer_id,
                request.version,
                request.fetch_option,
                context,
            )
            .await
    }

    async fn data(&self, request: DataRequest, context: &CancellationContext) -> Result<Vec<u8>> {
        if request.fetch_option.refreshes_in_background() {
            let refresh = request.clone().with_fetch_option(FetchOption::OnlineOnly);
            self.refresh_in_background("data", |repository, context| async move {
                data::fetch_data(&repository, &refresh, &context).await
            });
        }
        data::fetch_data(&self.repository, &request, context).await
    }

    /// Run `operation` as a task and hand its result to `callback`.
    fn spawn_with_callback<T, C, F, Fut>(&self, callback: C, operation: F) -> CancellationToken
    where
        T: Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
        F: FnOnce(CatalogClient, CancellationContext) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let context = CancellationContext::new();
        let token = context.token();
        let chain = operation(self.clone(), context);
        self.spawner.spawn(async move {
            callback(chain.await);
        });
        token
    }

    /// Refresh an entry with an independent online chain. The outcome is
    /// logged and discarded.
    fn refresh_in_background<T, F, Fut>(&self, what: &'static str, refresh: F)
    where
        F: FnOnce(Arc<Repository>, CancellationContext) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let chain = refresh(Arc::clone(&self.repository), CancellationContext::new());
        self.spawner.spawn(async move {
            match chain.await {
                Ok(_) => tracing::debug!(what, "background refresh completed"),
                Err(e) => tracing::warn!(what, error = %e, "background refresh failed"),
            }
        });
    }
}
