//! Request and result types of the public client surface.

use geocat_model::TileKey;

use crate::error::Error;
use crate::policy::FetchOption;

/// Request for the catalog configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRequest {
    /// Cache policy.
    pub fetch_option: FetchOption,
}

impl CatalogRequest {
    /// Request with the default cache policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_fetch_option(mut self, fetch_option: FetchOption) -> Self {
        self.fetch_option = fetch_option;
        self
    }
}

/// Request for the latest catalog version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogVersionRequest {
    /// Cache policy. Defaults to [`FetchOption::OnlineOnly`]: a cached
    /// latest version is stale by nature.
    pub fetch_option: FetchOption,
}

impl Default for CatalogVersionRequest {
    fn default() -> Self {
        Self {
            fetch_option: FetchOption::OnlineOnly,
        }
    }
}

impl CatalogVersionRequest {
    /// Request that always asks the service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_fetch_option(mut self, fetch_option: FetchOption) -> Self {
        self.fetch_option = fetch_option;
        self
    }
}

/// Request for the partition list of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionsRequest {
    /// Layer to list.
    pub layer_id: String,
    /// Catalog version to list at; the latest version when unset. Ignored
    /// for volatile layers.
    pub version: Option<i64>,
    /// Cache policy.
    pub fetch_option: FetchOption,
}

impl PartitionsRequest {
    /// List `layer_id` at the latest version with the default cache policy.
    #[must_use]
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            version: None,
            fetch_option: FetchOption::default(),
        }
    }

    /// Pin the catalog version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_fetch_option(mut self, fetch_option: FetchOption) -> Self {
        self.fetch_option = fetch_option;
        self
    }
}

/// Request for the payload of one partition.
///
/// Name the partition either by id, which costs a query for its data
/// handle, or directly by data handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Layer holding the partition.
    pub layer_id: String,
    /// Partition id.
    pub partition_id: Option<String>,
    /// Blob locator. Takes precedence over `partition_id`.
    pub data_handle: Option<String>,
    /// Catalog version; the latest version when unset. Ignored for volatile
    /// layers.
    pub version: Option<i64>,
    /// Cache policy.
    pub fetch_option: FetchOption,
}

impl DataRequest {
    /// Request for a payload of `layer_id`. Set a partition id or a data
    /// handle before issuing it.
    #[must_use]
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            partition_id: None,
            data_handle: None,
            version: None,
            fetch_option: FetchOption::default(),
        }
    }

    /// Address the payload by partition id.
    #[must_use]
    pub fn with_partition_id(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    /// Address the payload by data handle.
    #[must_use]
    pub fn with_data_handle(mut self, data_handle: impl Into<String>) -> Self {
        self.data_handle = Some(data_handle.into());
        self
    }

    /// Pin the catalog version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_fetch_option(mut self, fetch_option: FetchOption) -> Self {
        self.fetch_option = fetch_option;
        self
    }
}

/// Request to warm the cache with the tiles around a set of tile keys.
///
/// For every key, the tiles at levels `min_level..=max_level` that are the
/// key itself, its ancestors or its descendants are downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchRequest {
    /// Layer to prefetch from.
    pub layer_id: String,
    /// Tiles of interest.
    pub tile_keys: Vec<TileKey>,
    /// Shallowest level to prefetch.
    pub min_level: u32,
    /// Deepest level to prefetch.
    pub max_level: u32,
    /// Catalog version; the latest version when unset. Ignored for volatile
    /// layers.
    pub version: Option<i64>,
}

impl PrefetchRequest {
    /// Prefetch `tile_keys` of `layer_id` at their own levels.
    #[must_use]
    pub fn new(layer_id: impl Into<String>, tile_keys: Vec<TileKey>) -> Self {
        let min_level = tile_keys.iter().map(TileKey::level).min().unwrap_or(0);
        let max_level = tile_keys.iter().map(TileKey::level).max().unwrap_or(0);
        Self {
            layer_id: layer_id.into(),
            tile_keys,
            min_level,
            max_level,
            version: None,
        }
    }

    /// Set the level range.
    #[must_use]
    pub fn with_levels(mut self, min_level: u32, max_level: u32) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    /// Pin the catalog version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Outcome of a prefetch for one requested tile key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchTileResult {
    /// The requested key.
    pub tile_key: TileKey,
    /// Tiles related to the key whose payload is now cached.
    pub prefetched: Vec<TileKey>,
    /// First failure that affected the key, if any.
    pub error: Option<Error>,
}

impl PrefetchTileResult {
    /// Whether every related tile was prefetched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
