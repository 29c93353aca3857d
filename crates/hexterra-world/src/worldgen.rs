use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::noise::Octaves;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse terrain config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Grid(#[from] crate::grid::GridError),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TerrainConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub noise: Noise,
    #[serde(default)]
    pub height: Height,
    #[serde(default)]
    pub ridges: Ridges,
    #[serde(default)]
    pub plateaus: Plateaus,
    #[serde(default)]
    pub valleys: Valleys,
    #[serde(default)]
    pub detail: Detail,
    #[serde(default)]
    pub climate: Climate,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub streaming: Streaming,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            noise: Noise::default(),
            height: Height::default(),
            ridges: Ridges::default(),
            plateaus: Plateaus::default(),
            valleys: Valleys::default(),
            detail: Detail::default(),
            climate: Climate::default(),
            grid: Grid::default(),
            streaming: Streaming::default(),
        }
    }
}

fn default_seed() -> u64 {
    1337
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Noise {
    #[serde(default = "default_noise_scale")]
    pub scale: f64,
    #[serde(default = "default_noise_octaves")]
    pub octaves: u32,
    #[serde(default = "default_lacunarity")]
    pub lacunarity: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default = "default_true")]
    pub warp: bool,
    #[serde(default = "default_warp_strength")]
    pub warp_strength: f64,
}
fn default_noise_scale() -> f64 {
    0.0025
}
fn default_noise_octaves() -> u32 {
    5
}
fn default_lacunarity() -> f64 {
    2.0
}
fn default_gain() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_warp_strength() -> f64 {
    0.6
}
impl Default for Noise {
    fn default() -> Self {
        Self {
            scale: default_noise_scale(),
            octaves: default_noise_octaves(),
            lacunarity: default_lacunarity(),
            gain: default_gain(),
            warp: true,
            warp_strength: default_warp_strength(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Height {
    #[serde(default = "default_height_scale")]
    pub height_scale: f64,
    /// Normalized in [-1, 1]; below it cells classify as water.
    #[serde(default = "default_sea_level")]
    pub sea_level: f64,
    /// Half-width of the square around the origin where regions are placed.
    #[serde(default = "default_region_extent")]
    pub region_extent: f64,
}
fn default_height_scale() -> f64 {
    80.0
}
fn default_sea_level() -> f64 {
    -0.05
}
fn default_region_extent() -> f64 {
    2000.0
}
impl Default for Height {
    fn default() -> Self {
        Self {
            height_scale: default_height_scale(),
            sea_level: default_sea_level(),
            region_extent: default_region_extent(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ridges {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_ridge_count")]
    pub count: u32,
    #[serde(default = "default_ridge_scale")]
    pub scale: f64,
    #[serde(default = "default_ridge_octaves")]
    pub octaves: u32,
    #[serde(default = "default_ridge_lacunarity")]
    pub lacunarity: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default = "default_ridge_offset")]
    pub offset: f64,
    #[serde(default = "default_ridge_strength")]
    pub strength: f64,
    #[serde(default = "default_ridge_radius_min")]
    pub radius_min: f64,
    #[serde(default = "default_ridge_radius_max")]
    pub radius_max: f64,
    #[serde(default = "default_ridge_elongation")]
    pub elongation_max: f64,
}
fn default_ridge_count() -> u32 {
    6
}
fn default_ridge_scale() -> f64 {
    0.006
}
fn default_ridge_octaves() -> u32 {
    4
}
fn default_ridge_lacunarity() -> f64 {
    2.1
}
fn default_ridge_offset() -> f64 {
    1.0
}
fn default_ridge_strength() -> f64 {
    0.9
}
fn default_ridge_radius_min() -> f64 {
    300.0
}
fn default_ridge_radius_max() -> f64 {
    900.0
}
fn default_ridge_elongation() -> f64 {
    2.5
}
impl Default for Ridges {
    fn default() -> Self {
        Self {
            enable: true,
            count: default_ridge_count(),
            scale: default_ridge_scale(),
            octaves: default_ridge_octaves(),
            lacunarity: default_ridge_lacunarity(),
            gain: default_gain(),
            offset: default_ridge_offset(),
            strength: default_ridge_strength(),
            radius_min: default_ridge_radius_min(),
            radius_max: default_ridge_radius_max(),
            elongation_max: default_ridge_elongation(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Plateaus {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_plateau_count")]
    pub count: u32,
    #[serde(default = "default_plateau_radius_min")]
    pub radius_min: f64,
    #[serde(default = "default_plateau_radius_max")]
    pub radius_max: f64,
    #[serde(default = "default_plateau_target_min")]
    pub target_min: f64,
    #[serde(default = "default_plateau_target_max")]
    pub target_max: f64,
    /// Fraction of the radius that is fully flattened.
    #[serde(default = "default_plateau_core")]
    pub core: f64,
    #[serde(default = "default_plateau_falloff")]
    pub falloff_power: f64,
}
fn default_plateau_count() -> u32 {
    4
}
fn default_plateau_radius_min() -> f64 {
    120.0
}
fn default_plateau_radius_max() -> f64 {
    320.0
}
fn default_plateau_target_min() -> f64 {
    0.25
}
fn default_plateau_target_max() -> f64 {
    0.6
}
fn default_plateau_core() -> f64 {
    0.45
}
fn default_plateau_falloff() -> f64 {
    2.0
}
impl Default for Plateaus {
    fn default() -> Self {
        Self {
            enable: true,
            count: default_plateau_count(),
            radius_min: default_plateau_radius_min(),
            radius_max: default_plateau_radius_max(),
            target_min: default_plateau_target_min(),
            target_max: default_plateau_target_max(),
            core: default_plateau_core(),
            falloff_power: default_plateau_falloff(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Valleys {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_valley_count")]
    pub count: u32,
    #[serde(default = "default_valley_len_min")]
    pub half_length_min: f64,
    #[serde(default = "default_valley_len_max")]
    pub half_length_max: f64,
    #[serde(default = "default_valley_width_min")]
    pub half_width_min: f64,
    #[serde(default = "default_valley_width_max")]
    pub half_width_max: f64,
    #[serde(default = "default_valley_depth")]
    pub depth: f64,
}
fn default_valley_count() -> u32 {
    4
}
fn default_valley_len_min() -> f64 {
    200.0
}
fn default_valley_len_max() -> f64 {
    600.0
}
fn default_valley_width_min() -> f64 {
    30.0
}
fn default_valley_width_max() -> f64 {
    90.0
}
fn default_valley_depth() -> f64 {
    0.45
}
impl Default for Valleys {
    fn default() -> Self {
        Self {
            enable: true,
            count: default_valley_count(),
            half_length_min: default_valley_len_min(),
            half_length_max: default_valley_len_max(),
            half_width_min: default_valley_width_min(),
            half_width_max: default_valley_width_max(),
            depth: default_valley_depth(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Detail {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_detail_scale")]
    pub scale: f64,
    #[serde(default = "default_detail_octaves")]
    pub octaves: u32,
    #[serde(default = "default_detail_amplitude")]
    pub amplitude: f64,
}
fn default_detail_scale() -> f64 {
    0.08
}
fn default_detail_octaves() -> u32 {
    2
}
fn default_detail_amplitude() -> f64 {
    0.03
}
impl Default for Detail {
    fn default() -> Self {
        Self {
            enable: true,
            scale: default_detail_scale(),
            octaves: default_detail_octaves(),
            amplitude: default_detail_amplitude(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Climate {
    #[serde(default = "default_temp_freq")]
    pub temperature_frequency: f32,
    #[serde(default = "default_moist_freq")]
    pub moisture_frequency: f32,
    /// Temperature drop per unit of normalized height above sea level.
    #[serde(default = "default_lapse_rate")]
    pub lapse_rate: f32,
    #[serde(default = "default_jitter_scale")]
    pub jitter_scale: f64,
    #[serde(default = "default_hue_jitter")]
    pub hue_jitter: f32,
    #[serde(default = "default_sl_jitter")]
    pub saturation_jitter: f32,
    #[serde(default = "default_sl_jitter")]
    pub lightness_jitter: f32,
}
fn default_temp_freq() -> f32 {
    0.0012
}
fn default_moist_freq() -> f32 {
    0.0016
}
fn default_lapse_rate() -> f32 {
    0.5
}
fn default_jitter_scale() -> f64 {
    0.15
}
fn default_hue_jitter() -> f32 {
    6.0
}
fn default_sl_jitter() -> f32 {
    0.04
}
impl Default for Climate {
    fn default() -> Self {
        Self {
            temperature_frequency: default_temp_freq(),
            moisture_frequency: default_moist_freq(),
            lapse_rate: default_lapse_rate(),
            jitter_scale: default_jitter_scale(),
            hue_jitter: default_hue_jitter(),
            saturation_jitter: default_sl_jitter(),
            lightness_jitter: default_sl_jitter(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Grid {
    /// Hexagon circumradius in world units.
    #[serde(default = "default_hex_size")]
    pub hex_size: f64,
    /// Hexagons per chunk edge; a chunk holds `chunk_cells^2` hexagons.
    #[serde(default = "default_chunk_cells")]
    pub chunk_cells: u32,
}
fn default_hex_size() -> f64 {
    2.0
}
fn default_chunk_cells() -> u32 {
    16
}
impl Default for Grid {
    fn default() -> Self {
        Self {
            hex_size: default_hex_size(),
            chunk_cells: default_chunk_cells(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Streaming {
    #[serde(default = "default_load_distance")]
    pub load_distance: f64,
    #[serde(default = "default_unload_distance")]
    pub unload_distance: f64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_loads: usize,
    /// Zero selects one worker per available core, minus the coordinator.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_ms: u64,
}
fn default_load_distance() -> f64 {
    160.0
}
fn default_unload_distance() -> f64 {
    220.0
}
fn default_max_concurrent() -> usize {
    4
}
fn default_reconcile_interval() -> u64 {
    250
}
impl Default for Streaming {
    fn default() -> Self {
        Self {
            load_distance: default_load_distance(),
            unload_distance: default_unload_distance(),
            max_concurrent_loads: default_max_concurrent(),
            workers: 0,
            reconcile_interval_ms: default_reconcile_interval(),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl TerrainConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: TerrainConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    /// Rejects values that would make generation or streaming misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_grid()?;
        self.validate_streaming()?;
        self.validate_noise()?;
        self.validate_regions()
    }

    fn validate_grid(&self) -> Result<(), ConfigError> {
        if !(self.grid.hex_size.is_finite() && self.grid.hex_size > 0.0) {
            return Err(invalid("grid.hex_size", "must be positive"));
        }
        if self.grid.chunk_cells == 0 {
            return Err(invalid("grid.chunk_cells", "must be at least 1"));
        }
        Ok(())
    }

    fn validate_streaming(&self) -> Result<(), ConfigError> {
        let s = &self.streaming;
        if !(s.load_distance.is_finite() && s.load_distance > 0.0) {
            return Err(invalid("streaming.load_distance", "must be positive"));
        }
        // Chunk rows are the shorter pitch, so this bounds the keys one reconcile visits.
        let chunk_depth = 1.5 * self.grid.hex_size * f64::from(self.grid.chunk_cells);
        let max_load = chunk_depth * MAX_LOAD_RADIUS_CHUNKS;
        if s.load_distance > max_load {
            return Err(invalid(
                "streaming.load_distance",
                format!(
                    "{} exceeds {} chunks ({max_load} world units)",
                    s.load_distance, MAX_LOAD_RADIUS_CHUNKS
                ),
            ));
        }
        if !(s.unload_distance.is_finite() && s.unload_distance >= s.load_distance) {
            return Err(invalid(
                "streaming.unload_distance",
                format!(
                    "{} is below load_distance {}; loads would thrash at the boundary",
                    s.unload_distance, s.load_distance
                ),
            ));
        }
        if s.max_concurrent_loads == 0 {
            return Err(invalid("streaming.max_concurrent_loads", "must be at least 1"));
        }
        Ok(())
    }

    fn validate_noise(&self) -> Result<(), ConfigError> {
        if !(self.noise.scale.is_finite() && self.noise.scale > 0.0) {
            return Err(invalid("noise.scale", "must be positive"));
        }
        if self.noise.octaves > 16 || self.ridges.octaves > 16 || self.detail.octaves > 16 {
            return Err(invalid("octaves", "at most 16 octaves are supported"));
        }
        finite("noise.lacunarity", self.noise.lacunarity)?;
        finite("noise.gain", self.noise.gain)?;
        finite("noise.warp_strength", self.noise.warp_strength)?;
        finite("height.height_scale", self.height.height_scale)?;
        finite("height.sea_level", self.height.sea_level)?;
        finite("detail.scale", self.detail.scale)?;
        finite("detail.amplitude", self.detail.amplitude)?;
        finite("climate.jitter_scale", self.climate.jitter_scale)?;
        Ok(())
    }

    fn validate_regions(&self) -> Result<(), ConfigError> {
        let extent = self.height.region_extent;
        if !(extent.is_finite() && extent >= 0.0) {
            return Err(invalid("height.region_extent", "must be finite and not negative"));
        }

        let r = &self.ridges;
        if r.enable {
            positive_range("ridges.radius_min", "ridges.radius_max", r.radius_min, r.radius_max)?;
            if !(r.elongation_max.is_finite() && r.elongation_max >= 1.0) {
                return Err(invalid("ridges.elongation_max", "must be finite and at least 1"));
            }
            finite("ridges.scale", r.scale)?;
            finite("ridges.lacunarity", r.lacunarity)?;
            finite("ridges.gain", r.gain)?;
            finite("ridges.offset", r.offset)?;
            finite("ridges.strength", r.strength)?;
        }

        let p = &self.plateaus;
        if !(0.0..1.0).contains(&p.core) {
            return Err(invalid("plateaus.core", "must be in [0, 1)"));
        }
        if p.enable {
            positive_range("plateaus.radius_min", "plateaus.radius_max", p.radius_min, p.radius_max)?;
            finite("plateaus.target_min", p.target_min)?;
            finite("plateaus.target_max", p.target_max)?;
            if p.target_min > p.target_max {
                return Err(invalid("plateaus.target_min", "must not exceed target_max"));
            }
            finite("plateaus.falloff_power", p.falloff_power)?;
        }

        let v = &self.valleys;
        if v.enable {
            positive_range(
                "valleys.half_length_min",
                "valleys.half_length_max",
                v.half_length_min,
                v.half_length_max,
            )?;
            positive_range(
                "valleys.half_width_min",
                "valleys.half_width_max",
                v.half_width_min,
                v.half_width_max,
            )?;
            finite("valleys.depth", v.depth)?;
        }
        Ok(())
    }
}

/// Upper bound on `streaming.load_distance`, in chunk depths.
pub const MAX_LOAD_RADIUS_CHUNKS: f64 = 128.0;

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not a finite number")))
    }
}

fn positive_range(
    min_field: &'static str,
    max_field: &'static str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if !(min.is_finite() && min > 0.0) {
        return Err(invalid(min_field, "must be positive and finite"));
    }
    if !max.is_finite() {
        return Err(invalid(max_field, "must be finite"));
    }
    if min > max {
        return Err(invalid(min_field, format!("{min} exceeds {max_field} {max}")));
    }
    Ok(())
}

// Flattened params used in tight loops (snapshot of config)
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u64,
    pub noise_scale: f64,
    pub continent: Octaves,
    pub warp_enable: bool,
    pub warp_strength: f64,
    pub height_scale: f64,
    pub sea_level: f64,
    pub region_extent: f64,
    pub ridges: Option<Ridges>,
    pub plateaus: Option<Plateaus>,
    pub valleys: Option<Valleys>,
    pub detail: Option<Detail>,
    pub climate: Climate,
    pub hex_size: f64,
    pub chunk_cells: u32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self::from_config(&TerrainConfig::default())
    }
}

impl TerrainParams {
    pub fn from_config(cfg: &TerrainConfig) -> Self {
        Self {
            seed: cfg.seed,
            noise_scale: cfg.noise.scale,
            continent: Octaves::new(cfg.noise.octaves, cfg.noise.lacunarity, cfg.noise.gain),
            warp_enable: cfg.noise.warp,
            warp_strength: cfg.noise.warp_strength,
            height_scale: cfg.height.height_scale,
            sea_level: cfg.height.sea_level,
            region_extent: cfg.height.region_extent,
            ridges: cfg.ridges.enable.then(|| cfg.ridges.clone()),
            plateaus: cfg.plateaus.enable.then(|| cfg.plateaus.clone()),
            valleys: cfg.valleys.enable.then(|| cfg.valleys.clone()),
            detail: cfg.detail.enable.then(|| cfg.detail.clone()),
            climate: cfg.climate.clone(),
            hex_size: cfg.grid.hex_size,
            chunk_cells: cfg.grid.chunk_cells,
        }
    }
}
