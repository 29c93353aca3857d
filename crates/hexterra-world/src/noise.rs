//! Seeded 2D gradient noise and its octave combinators.

use std::f64::consts::FRAC_1_SQRT_2;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

const D: f64 = FRAC_1_SQRT_2;

// Unit gradients at multiples of 45 degrees.
const GRADIENTS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (D, D),
    (0.0, 1.0),
    (-D, D),
    (-1.0, 0.0),
    (-D, -D),
    (0.0, -1.0),
    (D, -D),
];

// Peak magnitude of the raw interpolant with unit gradients is sqrt(2)/2.
const OUTPUT_SCALE: f64 = std::f64::consts::SQRT_2;

/// Octave settings shared by the fractal combinators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Octaves {
    pub octaves: u32,
    pub lacunarity: f64,
    pub gain: f64,
}

impl Octaves {
    pub const fn new(octaves: u32, lacunarity: f64, gain: f64) -> Self {
        Self {
            octaves,
            lacunarity,
            gain,
        }
    }
}

/// Deterministic gradient noise over the plane.
///
/// Everything is a pure function of the permutation table, which in turn is a
/// pure function of the seed. Two fields built from the same seed return
/// bit-identical values for identical inputs.
#[derive(Clone)]
pub struct NoiseField {
    seed: u64,
    perm: Box<[u8; 512]>,
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

impl NoiseField {
    pub fn new(seed: u64) -> Self {
        let mut field = Self {
            seed,
            perm: Box::new([0u8; 512]),
        };
        field.seed(seed);
        field
    }

    /// Rebuilds the permutation table from `value`.
    pub fn seed(&mut self, value: u64) {
        let mut base: Vec<u8> = (0..=255u8).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(value);
        base.shuffle(&mut rng);
        for (i, p) in self.perm.iter_mut().enumerate() {
            *p = base[i & 255];
        }
        self.seed = value;
    }

    #[inline]
    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    fn gradient(&self, xi: usize, yi: usize) -> (f64, f64) {
        let h = self.perm[self.perm[xi] as usize + yi] as usize;
        GRADIENTS[h & 7]
    }

    /// Single-octave gradient noise, approximately in [-1, 1].
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        if !x.is_finite() || !y.is_finite() {
            return 0.0;
        }
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let xi = ((x0 as i64) & 255) as usize;
        let yi = ((y0 as i64) & 255) as usize;

        let g00 = self.gradient(xi, yi);
        let g10 = self.gradient(xi + 1, yi);
        let g01 = self.gradient(xi, yi + 1);
        let g11 = self.gradient(xi + 1, yi + 1);

        let n00 = g00.0 * fx + g00.1 * fy;
        let n10 = g10.0 * (fx - 1.0) + g10.1 * fy;
        let n01 = g01.0 * fx + g01.1 * (fy - 1.0);
        let n11 = g11.0 * (fx - 1.0) + g11.1 * (fy - 1.0);

        let u = fade(fx);
        let v = fade(fy);
        let nx0 = lerp(n00, n10, u);
        let nx1 = lerp(n01, n11, u);
        (lerp(nx0, nx1, v) * OUTPUT_SCALE).clamp(-1.0, 1.0)
    }

    /// Octave sum normalized by total amplitude; stays in [-1, 1].
    pub fn fractal_sum(&self, x: f64, y: f64, octaves: u32, lacunarity: f64, gain: f64) -> f64 {
        if octaves == 0 {
            return 0.0;
        }
        let mut freq = 1.0;
        let mut amp = 1.0;
        let mut sum = 0.0;
        let mut norm = 0.0;
        for _ in 0..octaves {
            sum += amp * self.sample(x * freq, y * freq);
            norm += f64::abs(amp);
            freq *= lacunarity;
            amp *= gain;
        }
        if norm <= f64::EPSILON {
            return 0.0;
        }
        (sum / norm).clamp(-1.0, 1.0)
    }

    /// Ridge-crested octave sum, normalized into [0, 1].
    pub fn ridged(
        &self,
        x: f64,
        y: f64,
        octaves: u32,
        lacunarity: f64,
        gain: f64,
        offset: f64,
    ) -> f64 {
        if octaves == 0 {
            return 0.0;
        }
        let peak = (offset * offset).max((offset - 1.0) * (offset - 1.0));
        if peak <= f64::EPSILON {
            return 0.0;
        }
        let mut freq = 1.0;
        let mut amp = 1.0;
        let mut sum = 0.0;
        let mut norm = 0.0;
        for _ in 0..octaves {
            let n = self.sample(x * freq, y * freq);
            let signal = offset - n.abs();
            sum += amp * signal * signal;
            norm += f64::abs(amp) * peak;
            freq *= lacunarity;
            amp *= gain;
        }
        if norm <= f64::EPSILON {
            return 0.0;
        }
        (sum / norm).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn fractal(&self, x: f64, y: f64, o: Octaves) -> f64 {
        self.fractal_sum(x, y, o.octaves, o.lacunarity, o.gain)
    }

    /// Input coordinates displaced by two decorrelated samples.
    pub fn warp(&self, x: f64, y: f64, strength: f64) -> (f64, f64) {
        let qx = self.sample(x + 5.2, y + 1.3);
        let qy = self.sample(x + 1.7, y + 9.2);
        (x + strength * qx, y + strength * qy)
    }

    pub fn domain_warp(&self, x: f64, y: f64, strength: f64) -> f64 {
        let (wx, wy) = self.warp(x, y, strength);
        self.sample(wx, wy)
    }
}

#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
