//! Partition index and version schemas.

use serde::{Deserialize, Serialize};

/// Metadata for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Partition id (a "here tile" string for tiled layers).
    pub partition: String,
    /// Opaque locator of the partition's payload in the blob service.
    pub data_handle: String,
    /// Catalog version the partition belongs to; absent for volatile layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Layer the partition belongs to, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Payload checksum, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Payload size in bytes, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<i64>,
    /// Compressed payload size in bytes, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_data_size: Option<i64>,
}

/// A page of partition metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitions {
    /// Partitions in this page.
    #[serde(default)]
    pub partitions: Vec<Partition>,
    /// Continuation token, when the service paginates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Response of the latest-version endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Latest catalog version.
    pub version: i64,
}

/// Version of one layer inside a catalog version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVersion {
    /// Layer id.
    pub layer: String,
    /// Version at which the layer last changed.
    pub version: i64,
    /// Change timestamp in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
}

/// Layer versions of one catalog version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerVersions {
    /// Catalog version these layer versions describe.
    #[serde(default)]
    pub version: i64,
    /// Per-layer versions.
    #[serde(default)]
    pub layer_versions: Vec<LayerVersion>,
}

impl LayerVersions {
    /// Version of a layer, if the layer is listed.
    #[must_use]
    pub fn layer_version(&self, layer: &str) -> Option<i64> {
        self.layer_versions
            .iter()
            .find(|entry| entry.layer == layer)
            .map(|entry| entry.version)
    }
}
