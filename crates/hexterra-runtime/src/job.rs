use hexterra_world::{HexCell, TerrainContext};

use crate::messages::GenerateJob;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("job expects {expected} cells per edge but the grid has {actual}")]
    GridMismatch { expected: u32, actual: u32 },
    #[error("chunk origin ({x}, {z}) is not finite")]
    NonFiniteOrigin { x: f64, z: f64 },
    #[error("chunk origin ({x}, {z}) does not match the grid origin for its key")]
    OriginMismatch { x: f64, z: f64 },
    #[error("height at ({x}, {z}) is not finite")]
    NonFinite { x: f64, z: f64 },
}

/// Samples every hexagon of the job's chunk in world space.
pub fn generate_chunk(ctx: &TerrainContext, job: &GenerateJob) -> Result<Vec<HexCell>, GenerationError> {
    let grid = ctx.grid();
    if job.chunk_cells != grid.chunk_cells() {
        return Err(GenerationError::GridMismatch {
            expected: job.chunk_cells,
            actual: grid.chunk_cells(),
        });
    }
    if !(job.origin_x.is_finite() && job.origin_z.is_finite()) {
        return Err(GenerationError::NonFiniteOrigin {
            x: job.origin_x,
            z: job.origin_z,
        });
    }
    let (ox, oz) = grid.chunk_origin(job.key);
    let tol = grid.hex_size() * 1e-6;
    if (ox - job.origin_x).abs() > tol || (oz - job.origin_z).abs() > tol {
        return Err(GenerationError::OriginMismatch {
            x: job.origin_x,
            z: job.origin_z,
        });
    }

    let generator = ctx.generator();
    let mut cells = Vec::with_capacity(grid.cells_per_chunk());
    for (x, z) in grid.hex_centers(job.key) {
        let sample = generator.sample(x, z);
        if !sample.height.is_finite() {
            return Err(GenerationError::NonFinite { x, z });
        }
        cells.push(HexCell {
            position: [x as f32, sample.height, z as f32],
            height: sample.height,
            color: sample.color,
        });
    }
    Ok(cells)
}
