use std::sync::Arc;

use crate::grid::{GridError, SpatialGrid};
use crate::height::HeightGenerator;
use crate::worldgen::{ConfigError, TerrainConfig, TerrainParams};

/// Immutable bundle of everything chunk generation needs.
///
/// Shared by `Arc` between the scheduler and the workers. A new configuration
/// produces a new context with the next `generation`; nothing is mutated in place.
pub struct TerrainContext {
    params: Arc<TerrainParams>,
    grid: SpatialGrid,
    generator: HeightGenerator,
    generation: u64,
}

impl TerrainContext {
    pub fn new(params: TerrainParams) -> Result<Self, GridError> {
        Self::with_generation(params, 0)
    }

    pub fn with_generation(params: TerrainParams, generation: u64) -> Result<Self, GridError> {
        let grid = SpatialGrid::new(params.hex_size, params.chunk_cells)?;
        let params = Arc::new(params);
        let generator = HeightGenerator::new(Arc::clone(&params));
        Ok(Self {
            params,
            grid,
            generator,
            generation,
        })
    }

    pub fn from_config(cfg: &TerrainConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::new(TerrainParams::from_config(cfg))?)
    }

    /// Builds the successor context for a replaced configuration.
    pub fn successor(&self, cfg: &TerrainConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::with_generation(
            TerrainParams::from_config(cfg),
            self.generation.wrapping_add(1),
        )?)
    }

    #[inline]
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    #[inline]
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    #[inline]
    pub fn generator(&self) -> &HeightGenerator {
        &self.generator
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.params.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_bumps_generation_and_reseeds() {
        let ctx = TerrainContext::from_config(&TerrainConfig::default()).unwrap();
        assert_eq!(ctx.generation(), 0);
        let mut cfg = TerrainConfig::default();
        cfg.seed = 99;
        let next = ctx.successor(&cfg).unwrap();
        assert_eq!(next.generation(), 1);
        assert_eq!(next.seed(), 99);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = TerrainConfig::default();
        cfg.grid.hex_size = -1.0;
        assert!(TerrainContext::from_config(&cfg).is_err());
    }

    #[test]
    fn reload_with_unbounded_regions_is_refused() {
        let ctx = TerrainContext::from_config(&TerrainConfig::default()).unwrap();
        let mut cfg = TerrainConfig::default();
        cfg.height.region_extent = f64::INFINITY;
        assert!(matches!(ctx.successor(&cfg), Err(ConfigError::Invalid { .. })));
        cfg.height.region_extent = 2000.0;
        cfg.ridges.radius_max = f64::INFINITY;
        assert!(matches!(ctx.successor(&cfg), Err(ConfigError::Invalid { .. })));
        assert_eq!(ctx.generation(), 0);
    }
}
