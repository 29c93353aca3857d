//! Chunk partitioning of the XZ plane and the hex lattice inside each chunk.
//!
//! Hexagons are pointy-top with circumradius `hex_size`. Columns are
//! `sqrt(3) * hex_size` apart and rows `1.5 * hex_size` apart, so a chunk of
//! `n` cells per edge spans `n` column pitches by `n` row pitches. Odd rows
//! (counted globally, not per chunk) sit half a column to the right, which
//! keeps the lattice continuous across chunk boundaries.

use crate::ChunkKey;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("hex size must be positive and finite, got {0}")]
    InvalidHexSize(f64),
    #[error("chunks must contain at least one cell per edge")]
    ZeroCells,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialGrid {
    hex_size: f64,
    chunk_cells: u32,
    col_pitch: f64,
    row_pitch: f64,
    extent_x: f64,
    extent_z: f64,
}

impl SpatialGrid {
    pub fn new(hex_size: f64, chunk_cells: u32) -> Result<Self, GridError> {
        if !(hex_size.is_finite() && hex_size > 0.0) {
            return Err(GridError::InvalidHexSize(hex_size));
        }
        if chunk_cells == 0 {
            return Err(GridError::ZeroCells);
        }
        let col_pitch = 3f64.sqrt() * hex_size;
        let row_pitch = 1.5 * hex_size;
        let n = f64::from(chunk_cells);
        Ok(Self {
            hex_size,
            chunk_cells,
            col_pitch,
            row_pitch,
            extent_x: col_pitch * n,
            extent_z: row_pitch * n,
        })
    }

    #[inline]
    pub fn hex_size(&self) -> f64 {
        self.hex_size
    }

    #[inline]
    pub fn chunk_cells(&self) -> u32 {
        self.chunk_cells
    }

    #[inline]
    pub fn cells_per_chunk(&self) -> usize {
        (self.chunk_cells as usize) * (self.chunk_cells as usize)
    }

    /// World-space size of one chunk along X and Z.
    #[inline]
    pub fn chunk_extent(&self) -> (f64, f64) {
        (self.extent_x, self.extent_z)
    }

    #[inline]
    pub fn chunk_key_for(&self, x: f64, z: f64) -> ChunkKey {
        ChunkKey::new(
            floor_to_i32(x / self.extent_x),
            floor_to_i32(z / self.extent_z),
        )
    }

    #[inline]
    pub fn chunk_origin(&self, key: ChunkKey) -> (f64, f64) {
        (
            f64::from(key.cx) * self.extent_x,
            f64::from(key.cz) * self.extent_z,
        )
    }

    #[inline]
    pub fn chunk_center(&self, key: ChunkKey) -> (f64, f64) {
        let (ox, oz) = self.chunk_origin(key);
        (ox + self.extent_x * 0.5, oz + self.extent_z * 0.5)
    }

    #[inline]
    pub fn distance_to_center(&self, key: ChunkKey, x: f64, z: f64) -> f64 {
        let (cx, cz) = self.chunk_center(key);
        ((cx - x) * (cx - x) + (cz - z) * (cz - z)).sqrt()
    }

    /// Every key whose center lies within `radius` of `(x, z)`, with its distance.
    pub fn keys_within(&self, x: f64, z: f64, radius: f64) -> Vec<(ChunkKey, f64)> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Vec::new();
        }
        let lo = self.chunk_key_for(x - radius, z - radius);
        let hi = self.chunk_key_for(x + radius, z + radius);
        let mut out = Vec::new();
        for cz in lo.cz..=hi.cz {
            for cx in lo.cx..=hi.cx {
                let key = ChunkKey::new(cx, cz);
                let d = self.distance_to_center(key, x, z);
                if d <= radius {
                    out.push((key, d));
                }
            }
        }
        out
    }

    /// Hexagon centers of one chunk in row-major order.
    pub fn hex_centers(&self, key: ChunkKey) -> impl Iterator<Item = (f64, f64)> + '_ {
        let (ox, oz) = self.chunk_origin(key);
        let n = self.chunk_cells;
        let row_base = i64::from(key.cz) * i64::from(n);
        (0..n).flat_map(move |r| {
            let odd = (row_base + i64::from(r)).rem_euclid(2) == 1;
            let shift = if odd { 0.75 } else { 0.25 };
            let z = oz + (f64::from(r) + 0.5) * self.row_pitch;
            (0..n).map(move |q| (ox + (f64::from(q) + shift) * self.col_pitch, z))
        })
    }
}

#[inline]
fn floor_to_i32(v: f64) -> i32 {
    // `as` saturates, so far-out coordinates clamp to the outermost key.
    v.floor() as i32
}
