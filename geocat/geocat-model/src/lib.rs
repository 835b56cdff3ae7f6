//! Resource names, tile keys and response schemas for partitioned geospatial
//! catalogs.
//!
//! This crate holds the synchronous, transport-free half of the catalog
//! client: everything needed to name a catalog, address quadtree tiles and
//! decode the JSON documents the catalog services return.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no I/O
//! - **Strict parsing**: Malformed names and responses are errors, never panics
//! - **Schema subset**: Only the fields the read path inspects are modeled

mod catalog;
mod error;
mod hrn;
mod lookup;
mod partition;
mod quadtree;
mod tile;

pub use catalog::{Catalog, Layer, LayerType, Partitioning};
pub use error::{ModelError, ModelResult};
pub use hrn::{DATA_SERVICE, Hrn};
pub use lookup::{Api, Apis};
pub use partition::{LayerVersion, LayerVersions, Partition, Partitions, VersionResponse};
pub use quadtree::{IndexedTile, ParentQuad, QUADTREE_DEPTH, QuadTreeIndex, SubQuad};
pub use tile::{MAX_LEVEL, TileKey};

/// Deserialize a JSON service response.
///
/// # Errors
///
/// Returns [`ModelError::InvalidResponse`] naming `context` if the body is not
/// valid JSON for `T`.
pub fn from_json<T: serde::de::DeserializeOwned>(
    context: &'static str,
    body: &[u8],
) -> ModelResult<T> {
    serde_json::from_slice(body).map_err(|e| ModelError::InvalidResponse {
        context,
        detail: e.to_string(),
    })
}
