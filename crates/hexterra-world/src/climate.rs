use fastnoise_lite::{FastNoiseLite, NoiseType};

use crate::worldgen::Climate as ClimateParams;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClimateSample {
    pub temperature: f32,
    pub moisture: f32,
}

/// Temperature and moisture fields, independent of the height noise.
pub struct Climate {
    temperature: FastNoiseLite,
    moisture: FastNoiseLite,
    lapse_rate: f32,
}

impl Climate {
    pub fn new(seed: u64, params: &ClimateParams) -> Self {
        let folded = (seed ^ (seed >> 32)) as u32;
        let mut t = FastNoiseLite::with_seed((folded ^ 0x1203_5F31) as i32);
        t.set_noise_type(Some(NoiseType::OpenSimplex2));
        t.set_frequency(Some(params.temperature_frequency));
        let mut m = FastNoiseLite::with_seed((folded ^ 0x92E3_A1B2) as i32);
        m.set_noise_type(Some(NoiseType::OpenSimplex2));
        m.set_frequency(Some(params.moisture_frequency));
        Self {
            temperature: t,
            moisture: m,
            lapse_rate: params.lapse_rate,
        }
    }

    /// `altitude` is normalized height above sea level (<= 0 for water).
    pub fn sample(&self, x: f64, z: f64, altitude: f32) -> ClimateSample {
        let (fx, fz) = (x as f32, z as f32);
        let base_t = (self.temperature.get_noise_2d(fx, fz) + 1.0) * 0.5;
        let cooled = base_t - self.lapse_rate * altitude.max(0.0);
        let mm = (self.moisture.get_noise_2d(fx, fz) + 1.0) * 0.5;
        ClimateSample {
            temperature: cooled.clamp(0.0, 1.0),
            moisture: mm.clamp(0.0, 1.0),
        }
    }
}
