//! Terrain sampling, chunk grid math, and worldgen parameters.
#![forbid(unsafe_code)]

pub mod biome;
pub mod climate;
pub mod context;
pub mod grid;
pub mod height;
pub mod noise;
pub mod worldgen;

pub use biome::Biome;
pub use context::TerrainContext;
pub use grid::{GridError, SpatialGrid};
pub use height::{HeightGenerator, TerrainSample};
pub use noise::NoiseField;
pub use worldgen::{ConfigError, TerrainConfig, TerrainParams};

use serde::{Deserialize, Serialize};

/// Identifies one chunk cell of the XZ plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkKey {
    #[inline]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    #[inline]
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cz: self.cz + dz,
        }
    }

    /// Packs both coordinates into one word; `cx` occupies the high half.
    #[inline]
    pub const fn pack(self) -> u64 {
        ((self.cx as u32 as u64) << 32) | (self.cz as u32 as u64)
    }

    #[inline]
    pub const fn unpack(packed: u64) -> Self {
        Self {
            cx: (packed >> 32) as u32 as i32,
            cz: packed as u32 as i32,
        }
    }

    #[inline]
    pub fn distance_sq(self, other: ChunkKey) -> i64 {
        let dx = i64::from(self.cx) - i64::from(other.cx);
        let dz = i64::from(self.cz) - i64::from(other.cz);
        dx * dx + dz * dz
    }
}

impl From<(i32, i32)> for ChunkKey {
    fn from(value: (i32, i32)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<ChunkKey> for (i32, i32) {
    fn from(value: ChunkKey) -> Self {
        (value.cx, value.cz)
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.cx, self.cz)
    }
}

/// One generated hexagon: world-space center (y = height) and linear RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HexCell {
    pub position: [f32; 3],
    pub height: f32,
    pub color: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_keeps_negative_coordinates() {
        for key in [
            ChunkKey::new(0, 0),
            ChunkKey::new(-1, 7),
            ChunkKey::new(i32::MIN, i32::MAX),
            ChunkKey::new(123_456, -98_765),
        ] {
            assert_eq!(ChunkKey::unpack(key.pack()), key);
        }
    }

    #[test]
    fn pack_distinguishes_swapped_axes() {
        assert_ne!(ChunkKey::new(1, 2).pack(), ChunkKey::new(2, 1).pack());
    }
}
