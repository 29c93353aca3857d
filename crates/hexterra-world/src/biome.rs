use serde::{Deserialize, Serialize};

use crate::climate::ClimateSample;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    DeepOcean,
    Ocean,
    Beach,
    Desert,
    Savanna,
    Grassland,
    Forest,
    Rainforest,
    Taiga,
    Tundra,
    Rock,
    Snow,
}

impl Biome {
    pub const ALL: [Biome; 12] = [
        Biome::DeepOcean,
        Biome::Ocean,
        Biome::Beach,
        Biome::Desert,
        Biome::Savanna,
        Biome::Grassland,
        Biome::Forest,
        Biome::Rainforest,
        Biome::Taiga,
        Biome::Tundra,
        Biome::Rock,
        Biome::Snow,
    ];

    /// Classifies from normalized height in [-1, 1] and the local climate.
    pub fn classify(height: f32, sea_level: f32, climate: ClimateSample) -> Biome {
        let ClimateSample {
            temperature: t,
            moisture: m,
        } = climate;
        if height < sea_level - 0.25 {
            return Biome::DeepOcean;
        }
        if height < sea_level {
            return Biome::Ocean;
        }
        if height < sea_level + 0.03 && t > 0.2 {
            return Biome::Beach;
        }
        if height > 0.6 {
            return if t < 0.3 { Biome::Snow } else { Biome::Rock };
        }
        if t < 0.2 {
            return Biome::Tundra;
        }
        if t < 0.4 {
            return if m > 0.35 { Biome::Taiga } else { Biome::Grassland };
        }
        if t < 0.7 {
            return if m > 0.5 { Biome::Forest } else { Biome::Grassland };
        }
        if m < 0.25 {
            Biome::Desert
        } else if m < 0.5 {
            Biome::Savanna
        } else {
            Biome::Rainforest
        }
    }

    /// Base color as (hue degrees, saturation, lightness).
    pub fn base_hsl(self) -> (f32, f32, f32) {
        match self {
            Biome::DeepOcean => (220.0, 0.60, 0.22),
            Biome::Ocean => (210.0, 0.55, 0.35),
            Biome::Beach => (45.0, 0.45, 0.70),
            Biome::Desert => (38.0, 0.55, 0.62),
            Biome::Savanna => (55.0, 0.40, 0.50),
            Biome::Grassland => (95.0, 0.45, 0.45),
            Biome::Forest => (120.0, 0.45, 0.30),
            Biome::Rainforest => (140.0, 0.55, 0.25),
            Biome::Taiga => (150.0, 0.25, 0.30),
            Biome::Tundra => (80.0, 0.12, 0.60),
            Biome::Rock => (25.0, 0.08, 0.42),
            Biome::Snow => (210.0, 0.10, 0.93),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Biome::DeepOcean => "deep_ocean",
            Biome::Ocean => "ocean",
            Biome::Beach => "beach",
            Biome::Desert => "desert",
            Biome::Savanna => "savanna",
            Biome::Grassland => "grassland",
            Biome::Forest => "forest",
            Biome::Rainforest => "rainforest",
            Biome::Taiga => "taiga",
            Biome::Tundra => "tundra",
            Biome::Rock => "rock",
            Biome::Snow => "snow",
        }
    }

    pub fn is_water(self) -> bool {
        matches!(self, Biome::DeepOcean | Biome::Ocean)
    }
}

/// HSL (hue in degrees) to gamma-encoded sRGB in [0, 1].
pub fn hsl_to_srgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let h = h.rem_euclid(360.0) / 360.0;
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    if s == 0.0 {
        return [l, l, l];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[inline]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn hsl_to_linear(h: f32, s: f32, l: f32) -> [f32; 3] {
    hsl_to_srgb(h, s, l).map(srgb_to_linear)
}
