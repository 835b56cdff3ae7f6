//! Metadata resolution chain.
//!
//! Every read of a catalog walks some prefix of the same chain: resolve the
//! service endpoint, find the latest catalog version, find the layer's
//! version, list or query partitions, download blobs. Each step is one
//! retried request under the caller's [`CancellationContext`] and fails fast.

use std::sync::Arc;

use urlencoding::encode;

use geocat_model::{
    Catalog, Hrn, Layer, LayerType, LayerVersions, Partition, Partitions, QuadTreeIndex, TileKey,
    VersionResponse,
};

use crate::cache::Cache;
use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::keys;
use crate::lookup::{ApiLookup, EndpointEntry};
use crate::policy::{CacheSlot, FetchOption, fetch_with_policy};
use crate::service::ServiceClient;
use crate::settings::ClientSettings;

pub(crate) const CONFIG_API: &str = "config";
pub(crate) const METADATA_API: &str = "metadata";
pub(crate) const QUERY_API: &str = "query";
pub(crate) const BLOB_API: &str = "blob";
pub(crate) const VOLATILE_BLOB_API: &str = "volatile-blob";
pub(crate) const STREAM_API: &str = "stream";

/// Version of each api the client speaks.
pub(crate) fn api_version(api: &str) -> &'static str {
    match api {
        STREAM_API => "v2",
        _ => "v1",
    }
}

/// A layer whose partitions can be read: versioned or volatile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadableLayer {
    /// Partitions are pinned to a catalog version.
    Versioned,
    /// Partitions change in place.
    Volatile,
}

impl ReadableLayer {
    pub(crate) fn is_versioned(self) -> bool {
        matches!(self, Self::Versioned)
    }

    pub(crate) fn blob_api(self) -> &'static str {
        match self {
            Self::Versioned => BLOB_API,
            Self::Volatile => VOLATILE_BLOB_API,
        }
    }
}

/// Reads metadata and blobs of one catalog.
pub(crate) struct Repository {
    hrn: Hrn,
    cache: Arc<dyn Cache>,
    lookup: ApiLookup,
    service: Arc<ServiceClient>,
}

impl Repository {
    pub(crate) fn new(hrn: Hrn, settings: &ClientSettings) -> Self {
        let service = Arc::new(ServiceClient::new(
            Arc::clone(&settings.network),
            settings.retry.clone(),
            settings.token_provider.clone(),
        ));
        let lookup = ApiLookup::new(
            settings.lookup_url.clone(),
            settings.lookup_ttl,
            Arc::clone(&settings.cache),
            Arc::clone(&service),
        );
        Self {
            hrn,
            cache: Arc::clone(&settings.cache),
            lookup,
            service,
        }
    }

    pub(crate) fn hrn(&self) -> &Hrn {
        &self.hrn
    }

    pub(crate) fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Issue `GET {api base}{path}` against this catalog.
    ///
    /// Access denial evicts everything cached for the catalog; a 404
    /// invalidates the endpoint so the next call resolves it again.
    async fn call(&self, api: &str, path: &str, context: &CancellationContext) -> Result<Vec<u8>> {
        let version = api_version(api);
        let result = async {
            let endpoint = self.lookup.resolve(&self.hrn, api, version, context).await?;
            let url = format!("{}{path}", endpoint.base_url);
            self.service.get(&url, context).await
        }
        .await;
        self.observe(api, version, &result);
        result
    }

    /// Resolve the endpoint of `api`, with the same failure handling as
    /// [`Self::call`].
    async fn resolve(&self, api: &str, context: &CancellationContext) -> Result<EndpointEntry> {
        let version = api_version(api);
        let result = self.lookup.resolve(&self.hrn, api, version, context).await;
        self.observe(api, version, &result);
        result
    }

    fn observe<T>(&self, api: &str, version: &str, result: &Result<T>) {
        match result {
            Err(Error::AccessDenied { url, .. }) => {
                tracing::info!(hrn = %self.hrn, url, "access denied, evicting catalog from cache");
                if let Err(e) = self.cache.remove_prefix(&keys::catalog_prefix(&self.hrn)) {
                    tracing::warn!(hrn = %self.hrn, error = %e, "failed to evict catalog");
                }
            }
            Err(Error::NotFound { .. }) => self.lookup.invalidate(&self.hrn, api, version),
            _ => {}
        }
    }

    /// The catalog configuration.
    pub(crate) async fn catalog(
        &self,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<Catalog> {
        context.check()?;
        let slot = CacheSlot::mutable(keys::catalog(&self.hrn));
        fetch_with_policy(self.cache(), &slot, option, || async move {
            let body = self
                .call(CONFIG_API, &format!("/catalogs/{}", self.hrn), context)
                .await?;
            Ok(geocat_model::from_json::<Catalog>("catalog", &body)?)
        })
        .await
    }

    /// Descriptor of `layer_id`, from the catalog configuration.
    pub(crate) async fn layer(
        &self,
        layer_id: &str,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<Layer> {
        let catalog = self.catalog(option.for_configuration(), context).await?;
        catalog.layer(layer_id).cloned().ok_or_else(|| {
            Error::invalid_argument(format!("layer {layer_id} does not exist in {}", self.hrn))
        })
    }

    /// Type of `layer_id`, if its partitions can be read.
    pub(crate) async fn readable_layer(
        &self,
        layer_id: &str,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<ReadableLayer> {
        match self.layer(layer_id, option, context).await?.layer_type {
            LayerType::Versioned => Ok(ReadableLayer::Versioned),
            LayerType::Volatile => Ok(ReadableLayer::Volatile),
            other => Err(Error::invalid_argument(format!(
                "layer {layer_id} is a {other:?} layer and has no readable partitions"
            ))),
        }
    }

    /// The latest catalog version.
    pub(crate) async fn latest_version(
        &self,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<i64> {
        context.check()?;
        let slot = CacheSlot::mutable(keys::latest_version(&self.hrn));
        let response: VersionResponse =
            fetch_with_policy(self.cache(), &slot, option, || async move {
                let body = self
                    .call(METADATA_API, "/versions/latest?startVersion=-1", context)
                    .await?;
                Ok(geocat_model::from_json::<VersionResponse>("latest version", &body)?)
            })
            .await?;
        Ok(response.version)
    }

    /// `version`, or the latest version when none is pinned.
    pub(crate) async fn version_or_latest(
        &self,
        version: Option<i64>,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<i64> {
        match version {
            Some(version) => Ok(version),
            None => self.latest_version(option, context).await,
        }
    }

    /// Versions of every layer at catalog `version`.
    pub(crate) async fn layer_versions(
        &self,
        version: i64,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<LayerVersions> {
        context.check()?;
        let slot = CacheSlot::protected(keys::layer_versions(&self.hrn, version));
        fetch_with_policy(self.cache(), &slot, option, || async move {
            let body = self
                .call(METADATA_API, &format!("/layerVersions?version={version}"), context)
                .await?;
            Ok(geocat_model::from_json::<LayerVersions>("layer versions", &body)?)
        })
        .await
    }

    /// Every partition of a layer.
    ///
    /// Versioned layers are listed at `version`, or at the latest version;
    /// volatile layers ignore `version`. A versioned layer with no entry in
    /// the catalog version's layer versions has no partitions.
    pub(crate) async fn partitions(
        &self,
        layer_id: &str,
        version: Option<i64>,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<Partitions> {
        match self.readable_layer(layer_id, option, context).await? {
            ReadableLayer::Volatile => {
                context.check()?;
                let slot = CacheSlot::mutable(keys::partitions(&self.hrn, layer_id, None));
                fetch_with_policy(self.cache(), &slot, option, || async move {
                    let path = format!("/layers/{}/partitions", encode(layer_id));
                    let body = self.call(METADATA_API, &path, context).await?;
                    Ok(geocat_model::from_json::<Partitions>("partitions", &body)?)
                })
                .await
            }
            ReadableLayer::Versioned => {
                let version = self.version_or_latest(version, option, context).await?;
                let layer_versions = self.layer_versions(version, option, context).await?;
                if layer_versions.layer_version(layer_id).is_none() {
                    tracing::debug!(layer_id, version, "layer has no data at this version");
                    return Ok(Partitions::default());
                }

                context.check()?;
                let slot =
                    CacheSlot::protected(keys::partitions(&self.hrn, layer_id, Some(version)));
                fetch_with_policy(self.cache(), &slot, option, || async move {
                    let path =
                        format!("/layers/{}/partitions?version={version}", encode(layer_id));
                    let body = self.call(METADATA_API, &path, context).await?;
                    Ok(geocat_model::from_json::<Partitions>("partitions", &body)?)
                })
                .await
            }
        }
    }

    /// Metadata of one partition, through the query service.
    pub(crate) async fn partition(
        &self,
        layer_id: &str,
        partition_id: &str,
        layer: ReadableLayer,
        version: Option<i64>,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<Partition> {
        context.check()?;
        let slot = CacheSlot::for_layer(
            keys::partition(&self.hrn, layer_id, partition_id, version),
            layer.is_versioned(),
        );
        let partitions: Partitions =
            fetch_with_policy(self.cache(), &slot, option, || async move {
                let mut path = format!(
                    "/layers/{}/partitions?partition={}",
                    encode(layer_id),
                    encode(partition_id)
                );
                if let Some(version) = version {
                    path.push_str(&format!("&version={version}"));
                }
                let body = self.call(QUERY_API, &path, context).await?;
                Ok(geocat_model::from_json::<Partitions>("partition", &body)?)
            })
            .await?;

        partitions
            .partitions
            .into_iter()
            .find(|partition| partition.partition == partition_id)
            .ok_or_else(|| {
                Error::not_found(format!("partition {partition_id} of layer {layer_id}"))
            })
    }

    /// Quadtree index rooted at `root`, covering `depth` levels below it.
    pub(crate) async fn quadtree(
        &self,
        layer_id: &str,
        root: TileKey,
        version: Option<i64>,
        depth: u32,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<QuadTreeIndex> {
        context.check()?;
        let slot = CacheSlot::for_layer(
            keys::quadtree(&self.hrn, layer_id, root, version, depth),
            version.is_some(),
        );
        fetch_with_policy(self.cache(), &slot, option, || async move {
            let layer = encode(layer_id);
            let path = match version {
                Some(version) => format!(
                    "/layers/{layer}/versions/{version}/quadkeys/{}/depths/{depth}",
                    root.to_here_tile()
                ),
                None => format!(
                    "/layers/{layer}/quadkeys/{}/depths/{depth}",
                    root.to_here_tile()
                ),
            };
            let body = self.call(QUERY_API, &path, context).await?;
            Ok(geocat_model::from_json::<QuadTreeIndex>("quadtree index", &body)?)
        })
        .await
    }

    /// Payload stored under `data_handle`.
    pub(crate) async fn blob(
        &self,
        layer_id: &str,
        data_handle: &str,
        layer: ReadableLayer,
        option: FetchOption,
        context: &CancellationContext,
    ) -> Result<Vec<u8>> {
        context.check()?;
        let slot = CacheSlot::for_layer(
            keys::data(&self.hrn, layer_id, data_handle),
            layer.is_versioned(),
        );
        fetch_with_policy(self.cache(), &slot, option, || async move {
            let path = format!(
                "/layers/{}/data/{}",
                encode(layer_id),
                encode(data_handle)
            );
            self.call(layer.blob_api(), &path, context).await
        })
        .await
    }

    /// Base URL of the stream service of a stream layer.
    pub(crate) async fn stream_endpoint(
        &self,
        layer_id: &str,
        context: &CancellationContext,
    ) -> Result<String> {
        let layer = self
            .layer(layer_id, FetchOption::CacheWithoutUpdate, context)
            .await?;
        if layer.layer_type != LayerType::Stream {
            return Err(Error::invalid_argument(format!(
                "layer {layer_id} is not a stream layer"
            )));
        }
        context.check()?;
        Ok(self.resolve(STREAM_API, context).await?.base_url)
    }
}
