//! Cache key layout.
//!
//! Every key starts with the catalog's resource name followed by `::`, so
//! all entries of one catalog can be dropped with a single prefix removal.

use geocat_model::{Hrn, TileKey};

/// Separator between key components.
pub const SEPARATOR: &str = "::";

/// Prefix shared by every entry of `hrn`.
#[must_use]
pub fn catalog_prefix(hrn: &Hrn) -> String {
    format!("{hrn}{SEPARATOR}")
}

/// Prefix shared by every entry of one layer.
#[must_use]
pub fn layer_prefix(hrn: &Hrn, layer: &str) -> String {
    format!("{hrn}{SEPARATOR}{layer}{SEPARATOR}")
}

/// Resolved endpoint of `api` for `hrn`.
///
/// The second component joins api and version with a single `:`, which no
/// layer id contains, so layer removal never reaches endpoints.
#[must_use]
pub fn endpoint(hrn: &Hrn, api: &str, version: &str) -> String {
    format!("{hrn}{SEPARATOR}{api}:{version}{SEPARATOR}api")
}

/// Whether `layer` can name a layer namespace of the key space.
#[must_use]
pub fn is_layer_id(layer: &str) -> bool {
    !layer.is_empty() && !layer.contains(':')
}

/// Catalog configuration.
#[must_use]
pub fn catalog(hrn: &Hrn) -> String {
    format!("{hrn}{SEPARATOR}catalog")
}

/// Latest catalog version.
#[must_use]
pub fn latest_version(hrn: &Hrn) -> String {
    format!("{hrn}{SEPARATOR}latestVersion")
}

/// Layer versions of catalog version `version`.
#[must_use]
pub fn layer_versions(hrn: &Hrn, version: i64) -> String {
    format!("{hrn}{SEPARATOR}{version}{SEPARATOR}layerVersions")
}

/// Partition list of a layer, at `version` or volatile.
#[must_use]
pub fn partitions(hrn: &Hrn, layer: &str, version: Option<i64>) -> String {
    match version {
        Some(version) => {
            format!("{hrn}{SEPARATOR}{layer}{SEPARATOR}{version}{SEPARATOR}partitions")
        }
        None => format!("{hrn}{SEPARATOR}{layer}{SEPARATOR}volatile{SEPARATOR}partitions"),
    }
}

/// Metadata of a single partition.
#[must_use]
pub fn partition(hrn: &Hrn, layer: &str, partition: &str, version: Option<i64>) -> String {
    match version {
        Some(version) => format!(
            "{hrn}{SEPARATOR}{layer}{SEPARATOR}{partition}{SEPARATOR}{version}{SEPARATOR}partition"
        ),
        None => format!("{hrn}{SEPARATOR}{layer}{SEPARATOR}{partition}{SEPARATOR}partition"),
    }
}

/// Quadtree index rooted at `root`.
#[must_use]
pub fn quadtree(hrn: &Hrn, layer: &str, root: TileKey, version: Option<i64>, depth: u32) -> String {
    let version = version.map_or_else(|| "volatile".to_string(), |v| v.to_string());
    format!(
        "{hrn}{SEPARATOR}{layer}{SEPARATOR}{}{SEPARATOR}{version}{SEPARATOR}{depth}{SEPARATOR}quadtree",
        root.to_here_tile()
    )
}

/// Payload stored under `data_handle`.
#[must_use]
pub fn data(hrn: &Hrn, layer: &str, data_handle: &str) -> String {
    format!("{hrn}{SEPARATOR}{layer}{SEPARATOR}{data_handle}{SEPARATOR}Data")
}
