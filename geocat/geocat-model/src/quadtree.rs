//! Quadtree index schema.
//!
//! A quadtree index query is rooted at one tile and returns every partition
//! within a fixed depth below it (`subQuads`), plus the partitions of the
//! root's ancestors (`parentQuads`).

use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::tile::TileKey;

/// Deepest depth a single quadtree index query may cover.
pub const QUADTREE_DEPTH: u32 = 4;

/// A partition below the query root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuad {
    /// Tile relative to the query root, in "here tile" form.
    pub sub_quad_key: String,
    /// Catalog version of the partition, absent for volatile layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Blob locator of the partition's payload.
    pub data_handle: String,
    /// Payload size in bytes, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<i64>,
}

/// A partition above the query root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentQuad {
    /// Absolute partition id in "here tile" form.
    pub partition: String,
    /// Catalog version of the partition, absent for volatile layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Blob locator of the partition's payload.
    pub data_handle: String,
    /// Payload size in bytes, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<i64>,
}

/// Result of one quadtree index query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuadTreeIndex {
    /// Partitions at or below the root.
    #[serde(default)]
    pub sub_quads: Vec<SubQuad>,
    /// Partitions above the root.
    #[serde(default)]
    pub parent_quads: Vec<ParentQuad>,
}

/// A partition located by a quadtree index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedTile {
    /// Absolute tile of the partition.
    pub tile: TileKey,
    /// Blob locator of the partition's payload.
    pub data_handle: String,
    /// Catalog version of the partition, absent for volatile layers.
    pub version: Option<i64>,
}

impl QuadTreeIndex {
    /// Resolve every entry of the index to an absolute tile.
    ///
    /// # Errors
    ///
    /// Returns an error if a sub quad or parent quad key is malformed.
    pub fn tiles(&self, root: TileKey) -> ModelResult<Vec<IndexedTile>> {
        let mut tiles = Vec::with_capacity(self.sub_quads.len() + self.parent_quads.len());
        for quad in &self.sub_quads {
            tiles.push(IndexedTile {
                tile: root.added_sub_here_tile(&quad.sub_quad_key)?,
                data_handle: quad.data_handle.clone(),
                version: quad.version,
            });
        }
        for quad in &self.parent_quads {
            tiles.push(IndexedTile {
                tile: TileKey::from_here_tile(&quad.partition)?,
                data_handle: quad.data_handle.clone(),
                version: quad.version,
            });
        }
        Ok(tiles)
    }
}
