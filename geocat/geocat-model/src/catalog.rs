//! Catalog configuration schema.

use serde::{Deserialize, Serialize};

/// How a layer stores and versions its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    /// Partitions are immutable per catalog version.
    Versioned,
    /// Partitions are overwritten in place, with no version history.
    Volatile,
    /// Data arrives as a message stream; there is no partition index.
    Stream,
    /// Partitions are addressed through an index service.
    Index,
}

impl LayerType {
    /// Whether partitions of this layer carry a catalog version.
    #[must_use]
    pub fn is_versioned(self) -> bool {
        matches!(self, Self::Versioned)
    }
}

/// How a layer's partitions map to tiles, when they do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitioning {
    /// Partitioning scheme, e.g. `heretile` or `generic`.
    #[serde(default)]
    pub scheme: String,
    /// Tile levels that carry data, for tiled layers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_levels: Vec<u32>,
}

/// Layer descriptor, as listed in the catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Layer id, unique within the catalog.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Storage type of the layer.
    pub layer_type: LayerType,
    /// MIME type of partition payloads.
    #[serde(default)]
    pub content_type: String,
    /// Content encoding of partition payloads (e.g. `gzip`), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Partitioning scheme.
    #[serde(default)]
    pub partitioning: Partitioning,
}

/// Catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Catalog id.
    pub id: String,
    /// Resource name of the catalog.
    pub hrn: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Configuration version.
    #[serde(default)]
    pub version: i64,
    /// Layers of the catalog.
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Catalog {
    /// Find a layer by id.
    #[must_use]
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }
}
