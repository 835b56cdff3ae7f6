//! Async read client for partitioned, versioned geospatial data catalogs.
//!
//! This crate resolves a catalog's resource name into service endpoints,
//! walks the metadata chain (catalog configuration, versions, partition
//! lists, quadtree indexes) and downloads partition payloads, serving each
//! read from a local cache, the network, or both as the request's
//! [`FetchOption`] decides.
//!
//! # Design principles
//!
//! - **Non-blocking**: Every read is an `async fn`, with a callback form that
//!   returns a [`CancellationToken`] immediately
//! - **Cooperative cancellation**: Each step of a request chain checks its
//!   context before issuing the next request
//! - **Pluggable ports**: Transport and storage sit behind the [`Network`]
//!   and [`Cache`] traits
//!
//! # Example
//!
//! ```ignore
//! use geocat::{CatalogClient, ClientSettings, DataRequest, FetchOption, Hrn};
//!
//! let hrn = Hrn::parse("hrn:here:data:::example-catalog")?;
//! let client = CatalogClient::new(hrn, ClientSettings::default())?;
//!
//! // Serve from cache when possible, refreshing it in the background.
//! let payload = client
//!     .fetch_data(
//!         DataRequest::new("roads")
//!             .with_partition_id("23618364")
//!             .with_fetch_option(FetchOption::CacheWithUpdate),
//!     )
//!     .await?;
//! ```

pub mod cache;
mod cancellation;
mod client;
mod data;
mod error;
pub mod keys;
mod lookup;
mod metadata;
pub mod network;
mod policy;
mod prefetch;
pub mod retry;
mod runtime;
mod service;
mod settings;
pub mod types;

pub use cache::{Cache, CacheScope, MemoryCache, NoCache};
pub use cancellation::{CancellationContext, CancellationToken, InFlight};
pub use client::CatalogClient;
pub use error::{Error, Result};
pub use lookup::EndpointEntry;
pub use network::{HttpNetwork, HttpRequest, HttpResponse, Network, RequestId, SendFuture};
pub use policy::{Cached, FetchOption};
pub use prefetch::MAX_PREFETCH_ROOTS;
pub use retry::{Backoff, RetrySettings};
pub use settings::{
    ClientSettings, DEFAULT_CACHE_SIZE, DEFAULT_LOOKUP_TTL, DEFAULT_LOOKUP_URL,
    DEFAULT_PREFETCH_CONCURRENCY, TokenProvider,
};
pub use types::{
    CatalogRequest, CatalogVersionRequest, DataRequest, PartitionsRequest, PrefetchRequest,
    PrefetchTileResult,
};

// Re-export model types for convenience.
pub use geocat_model::{
    Catalog, Hrn, Layer, LayerType, Partition, Partitions, QUADTREE_DEPTH, TileKey,
};
