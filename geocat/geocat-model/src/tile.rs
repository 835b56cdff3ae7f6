//! Quadtree tile keys.
//!
//! A tile at level `n` is one cell of a `2^n x 2^n` grid. Tiles are named in
//! two forms:
//!
//! - **Quadkey**: one base-4 digit per level, most significant first. Digit
//!   bits are `(row_bit << 1) | column_bit`. The root tile is the empty string.
//! - **Here tile**: the decimal form of `(1 << 2n) | morton`, where `morton`
//!   interleaves column (even bits) and row (odd bits). The root is `"1"`.
//!   Partition ids of tiled layers and quadtree index queries use this form.

use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Deepest level a tile key can address.
pub const MAX_LEVEL: u32 = 31;

/// A tile in the quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u32,
    morton: u64,
}

impl TileKey {
    /// The level-0 tile covering everything.
    pub const ROOT: Self = Self { level: 0, morton: 0 };

    /// Create a tile from grid coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTileKey`] if the level exceeds
    /// [`MAX_LEVEL`] or a coordinate falls outside the level's grid.
    pub fn from_row_column_level(row: u32, column: u32, level: u32) -> ModelResult<Self> {
        let invalid = |detail| ModelError::InvalidTileKey {
            input: format!("row={row} column={column} level={level}"),
            detail,
        };
        if level > MAX_LEVEL {
            return Err(invalid("level too deep"));
        }
        let size = 1u64 << level;
        if u64::from(row) >= size || u64::from(column) >= size {
            return Err(invalid("coordinate outside the level grid"));
        }

        let mut morton = 0u64;
        for bit in 0..level {
            morton |= u64::from((column >> bit) & 1) << (2 * bit);
            morton |= u64::from((row >> bit) & 1) << (2 * bit + 1);
        }
        Ok(Self { level, morton })
    }

    /// Parse a base-4 quadkey string.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTileKey`] if the string contains a digit
    /// other than `0`-`3` or is longer than [`MAX_LEVEL`].
    pub fn from_quadkey(quadkey: &str) -> ModelResult<Self> {
        let invalid = |detail| ModelError::InvalidTileKey {
            input: quadkey.to_string(),
            detail,
        };
        if quadkey.len() > MAX_LEVEL as usize {
            return Err(invalid("quadkey too long"));
        }

        let mut morton = 0u64;
        for c in quadkey.chars() {
            let digit = c.to_digit(4).ok_or_else(|| invalid("digits must be 0-3"))?;
            morton = (morton << 2) | u64::from(digit);
        }
        #[allow(clippy::cast_possible_truncation)]
        let level = quadkey.len() as u32;
        Ok(Self { level, morton })
    }

    /// Parse the decimal "here tile" form.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTileKey`] if the value is not a positive
    /// integer with its marker bit on an even bit position.
    pub fn from_here_tile(here_tile: &str) -> ModelResult<Self> {
        let invalid = |detail| ModelError::InvalidTileKey {
            input: here_tile.to_string(),
            detail,
        };
        let value: u64 = here_tile
            .parse()
            .map_err(|_| invalid("not a decimal integer"))?;
        Self::from_here_tile_value(value)
            .ok_or_else(|| invalid("marker bit must be on an even bit"))
    }

    fn from_here_tile_value(value: u64) -> Option<Self> {
        if value == 0 {
            return None;
        }
        let marker = 63 - value.leading_zeros();
        if marker % 2 != 0 {
            return None;
        }
        Some(Self {
            level: marker / 2,
            morton: value & !(1u64 << marker),
        })
    }

    /// The tile's level (0 for the root).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Row in the level's grid.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.deinterleave(1)
    }

    /// Column in the level's grid.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.deinterleave(0)
    }

    fn deinterleave(&self, offset: u32) -> u32 {
        let mut value = 0u32;
        for bit in 0..self.level {
            #[allow(clippy::cast_possible_truncation)]
            let b = ((self.morton >> (2 * bit + offset)) & 1) as u32;
            value |= b << bit;
        }
        value
    }

    /// Base-4 quadkey string.
    #[must_use]
    pub fn to_quadkey(&self) -> String {
        let mut quadkey = String::with_capacity(self.level as usize);
        for i in (0..self.level).rev() {
            let digit = (self.morton >> (2 * i)) & 3;
            #[allow(clippy::cast_possible_truncation)]
            quadkey.push((b'0' + digit as u8) as char);
        }
        quadkey
    }

    /// Integer "here tile" value.
    #[must_use]
    pub fn here_tile_value(&self) -> u64 {
        (1u64 << (2 * self.level)) | self.morton
    }

    /// Decimal "here tile" string.
    #[must_use]
    pub fn to_here_tile(&self) -> String {
        self.here_tile_value().to_string()
    }

    /// The parent tile, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.level > 0).then(|| Self {
            level: self.level - 1,
            morton: self.morton >> 2,
        })
    }

    /// The ancestor at `level`, or `None` if `level` is deeper than this tile.
    #[must_use]
    pub fn ancestor_at(&self, level: u32) -> Option<Self> {
        (level <= self.level).then(|| Self {
            level,
            morton: self.morton >> (2 * (self.level - level)),
        })
    }

    /// The four children, or an empty list at [`MAX_LEVEL`].
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        if self.level >= MAX_LEVEL {
            return Vec::new();
        }
        (0..4)
            .map(|digit| Self {
                level: self.level + 1,
                morton: (self.morton << 2) | digit,
            })
            .collect()
    }

    /// All descendants exactly `depth` levels below this tile.
    ///
    /// Returns an empty list if that would exceed [`MAX_LEVEL`].
    #[must_use]
    pub fn descendants_at_depth(&self, depth: u32) -> Vec<Self> {
        if self.level + depth > MAX_LEVEL {
            return Vec::new();
        }
        let count = 1u64 << (2 * depth);
        let base = self.morton << (2 * depth);
        (0..count)
            .map(|offset| Self {
                level: self.level + depth,
                morton: base | offset,
            })
            .collect()
    }

    /// Whether this tile is `other` or one of its ancestors.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other
            .ancestor_at(self.level)
            .is_some_and(|ancestor| ancestor == *self)
    }

    /// Whether one of the two tiles contains the other.
    #[must_use]
    pub fn is_related_to(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Resolve a sub-tile given in "here tile" form relative to this tile.
    ///
    /// Quadtree index responses name their entries this way: `"1"` is the
    /// query root itself, `"4"`..`"7"` its children, and so on.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTileKey`] if the relative key is malformed
    /// or the result would exceed [`MAX_LEVEL`].
    pub fn added_sub_here_tile(&self, sub_here_tile: &str) -> ModelResult<Self> {
        let sub = Self::from_here_tile(sub_here_tile)?;
        if self.level + sub.level > MAX_LEVEL {
            return Err(ModelError::InvalidTileKey {
                input: sub_here_tile.to_string(),
                detail: "sub tile exceeds the deepest level",
            });
        }
        Ok(Self {
            level: self.level + sub.level,
            morton: (self.morton << (2 * sub.level)) | sub.morton,
        })
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.here_tile_value())
    }
}
