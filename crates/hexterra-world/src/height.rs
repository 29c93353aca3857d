//! Height and color field evaluated in world space.
//!
//! The height is built in normalized units (roughly [-1, 1]) and scaled by
//! `height_scale` at the end:
//! 1. continent: fractal sum at the coarse scale, optionally domain-warped;
//! 2. ridges: ridged noise weighted by mountain-range influence;
//! 3. plateaus: blend toward a flat target inside each plateau radius;
//! 4. valleys: directional trenches cut along a centerline;
//! 5. detail: small-scale fractal noise.
//!
//! Region lists are drawn from the seed once, at construction.

use std::f64::consts::TAU;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::biome::{Biome, hsl_to_linear};
use crate::climate::Climate;
use crate::noise::NoiseField;
use crate::worldgen::TerrainParams;

const SALT_CONTINENT: u64 = 0x5EED_0001;
const SALT_WARP: u64 = 0x5EED_0002;
const SALT_RIDGE: u64 = 0x5EED_0003;
const SALT_DETAIL: u64 = 0x5EED_0004;
const SALT_JITTER: u64 = 0x5EED_0005;
const SALT_REGIONS: u64 = 0x5EED_00F0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MountainRange {
    pub center: (f64, f64),
    pub radius: f64,
    /// Direction of the long axis, radians.
    pub direction: f64,
    /// Long-axis radius divided by short-axis radius.
    pub elongation: f64,
    pub intensity: f64,
}

impl MountainRange {
    /// Elliptical influence in [0, intensity]; zero beyond the radius.
    pub fn influence(&self, x: f64, z: f64) -> f64 {
        let (dx, dz) = (x - self.center.0, z - self.center.1);
        let (sin, cos) = self.direction.sin_cos();
        let u = dx * cos + dz * sin;
        let v = -dx * sin + dz * cos;
        let a = u / (self.radius * self.elongation);
        let b = v / self.radius;
        let d = (a * a + b * b).sqrt();
        if d >= 1.0 {
            return 0.0;
        }
        self.intensity * smoothstep(1.0 - d)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plateau {
    pub center: (f64, f64),
    pub radius: f64,
    /// Normalized target height.
    pub target: f64,
    pub core: f64,
    pub falloff_power: f64,
}

impl Plateau {
    /// Blend weight toward the target: 1 in the core, `(1 - t)^power` on the rim.
    pub fn weight(&self, x: f64, z: f64) -> f64 {
        let (dx, dz) = (x - self.center.0, z - self.center.1);
        let d = (dx * dx + dz * dz).sqrt() / self.radius;
        if d >= 1.0 {
            return 0.0;
        }
        if d <= self.core {
            return 1.0;
        }
        let t = (d - self.core) / (1.0 - self.core);
        (1.0 - t).powf(self.falloff_power)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Valley {
    pub center: (f64, f64),
    pub direction: f64,
    pub half_length: f64,
    pub half_width: f64,
    /// Normalized depth at the centerline.
    pub depth: f64,
}

impl Valley {
    /// Depth cut at `(x, z)`: deepest on the centerline, zero past the half width.
    pub fn cut(&self, x: f64, z: f64) -> f64 {
        let (dx, dz) = (x - self.center.0, z - self.center.1);
        let (sin, cos) = self.direction.sin_cos();
        let along = (dx * cos + dz * sin).abs();
        let across = (-dx * sin + dz * cos).abs();
        if along >= self.half_length || across >= self.half_width {
            return 0.0;
        }
        let w = across / self.half_width;
        let cross = 1.0 - w * w;
        let e = along / self.half_length;
        let ends = if e < 0.8 {
            1.0
        } else {
            smoothstep((1.0 - e) / 0.2)
        };
        self.depth * cross * ends
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSample {
    pub height: f32,
    /// Height divided by `height_scale`, clamped to [-1, 1].
    pub normalized: f32,
    pub biome: Biome,
    pub color: [f32; 3],
}

pub struct HeightGenerator {
    params: Arc<TerrainParams>,
    continent: NoiseField,
    warp: NoiseField,
    ridge: NoiseField,
    detail: NoiseField,
    jitter: NoiseField,
    climate: Climate,
    ranges: Vec<MountainRange>,
    plateaus: Vec<Plateau>,
    valleys: Vec<Valley>,
}

impl HeightGenerator {
    pub fn new(params: Arc<TerrainParams>) -> Self {
        let seed = params.seed;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ SALT_REGIONS);
        let extent = params.region_extent;

        let ranges = match params.ridges.as_ref() {
            Some(r) => (0..r.count)
                .map(|_| MountainRange {
                    center: (span(&mut rng, -extent, extent), span(&mut rng, -extent, extent)),
                    radius: span(&mut rng, r.radius_min, r.radius_max),
                    direction: span(&mut rng, 0.0, TAU),
                    elongation: span(&mut rng, 1.0, r.elongation_max.max(1.0)),
                    intensity: span(&mut rng, 0.5, 1.0),
                })
                .collect(),
            None => Vec::new(),
        };
        let plateaus = match params.plateaus.as_ref() {
            Some(p) => (0..p.count)
                .map(|_| Plateau {
                    center: (span(&mut rng, -extent, extent), span(&mut rng, -extent, extent)),
                    radius: span(&mut rng, p.radius_min, p.radius_max),
                    target: span(&mut rng, p.target_min, p.target_max),
                    core: p.core,
                    falloff_power: p.falloff_power,
                })
                .collect(),
            None => Vec::new(),
        };
        let valleys = match params.valleys.as_ref() {
            Some(v) => (0..v.count)
                .map(|_| Valley {
                    center: (span(&mut rng, -extent, extent), span(&mut rng, -extent, extent)),
                    direction: span(&mut rng, 0.0, TAU),
                    half_length: span(&mut rng, v.half_length_min, v.half_length_max),
                    half_width: span(&mut rng, v.half_width_min, v.half_width_max),
                    depth: v.depth,
                })
                .collect(),
            None => Vec::new(),
        };
        log::debug!(
            "terrain seed {}: {} ranges, {} plateaus, {} valleys",
            seed,
            ranges.len(),
            plateaus.len(),
            valleys.len()
        );

        Self {
            continent: NoiseField::new(seed ^ SALT_CONTINENT),
            warp: NoiseField::new(seed ^ SALT_WARP),
            ridge: NoiseField::new(seed ^ SALT_RIDGE),
            detail: NoiseField::new(seed ^ SALT_DETAIL),
            jitter: NoiseField::new(seed ^ SALT_JITTER),
            climate: Climate::new(seed, &params.climate),
            ranges,
            plateaus,
            valleys,
            params,
        }
    }

    #[inline]
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn mountain_ranges(&self) -> &[MountainRange] {
        &self.ranges
    }

    pub fn plateaus(&self) -> &[Plateau] {
        &self.plateaus
    }

    pub fn valleys(&self) -> &[Valley] {
        &self.valleys
    }

    /// Height in normalized units before `height_scale`.
    pub fn normalized_height_at(&self, x: f64, z: f64) -> f64 {
        let p = &*self.params;
        let (nx, nz) = (x * p.noise_scale, z * p.noise_scale);
        let (nx, nz) = if p.warp_enable {
            self.warp.warp(nx, nz, p.warp_strength)
        } else {
            (nx, nz)
        };
        let mut h = self.continent.fractal(nx, nz, p.continent);

        if let Some(r) = p.ridges.as_ref() {
            let influence: f64 = self.ranges.iter().map(|m| m.influence(x, z)).sum();
            if influence > 0.0 {
                let ridged = self.ridge.ridged(
                    x * r.scale,
                    z * r.scale,
                    r.octaves,
                    r.lacunarity,
                    r.gain,
                    r.offset,
                );
                h += ridged * influence.min(1.5) * r.strength;
            }
        }

        for plateau in &self.plateaus {
            let w = plateau.weight(x, z);
            if w > 0.0 {
                h += (plateau.target - h) * w;
            }
        }

        for valley in &self.valleys {
            h -= valley.cut(x, z);
        }

        if let Some(d) = p.detail.as_ref() {
            h += self
                .detail
                .fractal_sum(x * d.scale, z * d.scale, d.octaves, 2.0, 0.5)
                * d.amplitude;
        }
        h
    }

    pub fn height_at(&self, x: f64, z: f64) -> f32 {
        (self.normalized_height_at(x, z) * self.params.height_scale) as f32
    }

    fn normalize(&self, height: f32) -> f32 {
        let scale = self.params.height_scale;
        if scale <= 0.0 {
            return 0.0;
        }
        (f64::from(height) / scale).clamp(-1.0, 1.0) as f32
    }

    pub fn biome_at(&self, x: f64, z: f64, height: f32) -> Biome {
        let nh = self.normalize(height);
        let sea = self.params.sea_level as f32;
        let climate = self.climate.sample(x, z, nh - sea);
        Biome::classify(nh, sea, climate)
    }

    /// Linear RGB color for a point whose height is already known.
    pub fn color_at(&self, x: f64, z: f64, height: f32) -> [f32; 3] {
        let biome = self.biome_at(x, z, height);
        self.shade(x, z, biome)
    }

    fn shade(&self, x: f64, z: f64, biome: Biome) -> [f32; 3] {
        let c = &self.params.climate;
        let (jx, jz) = (x * c.jitter_scale, z * c.jitter_scale);
        let jh = self.jitter.sample(jx, jz) as f32;
        let js = self.jitter.sample(jx + 31.7, jz - 12.9) as f32;
        let jl = self.jitter.sample(jx - 47.3, jz + 8.1) as f32;
        let (h, s, l) = biome.base_hsl();
        hsl_to_linear(
            h + jh * c.hue_jitter,
            s + js * c.saturation_jitter,
            l + jl * c.lightness_jitter,
        )
    }

    pub fn sample(&self, x: f64, z: f64) -> TerrainSample {
        let height = self.height_at(x, z);
        let biome = self.biome_at(x, z, height);
        TerrainSample {
            height,
            normalized: self.normalize(height),
            biome,
            color: self.shade(x, z, biome),
        }
    }
}

#[inline]
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// `random_range` panics on an empty or non-finite span.
fn span(rng: &mut ChaCha8Rng, lo: f64, hi: f64) -> f64 {
    if hi > lo && (hi - lo).is_finite() {
        rng.random_range(lo..hi)
    } else {
        lo
    }
}
