//! Synthetic "no gesture" samples.
//!
//! The classifier has no natural negative data, so a fraction of the
//! training set is synthesized from the positives and labeled with the
//! sentinel class. Three strategies are mixed uniformly at random.

use candle_core::{Error, Result};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Real sample plus Gaussian noise
    GaussianNoise,
    /// Every component uniform in a symmetric range
    RandomPose,
    /// Convex mix of two distinct real samples
    Interpolation,
}

impl SynthesisMode {
    pub const ALL: [SynthesisMode; 3] = [
        SynthesisMode::GaussianNoise,
        SynthesisMode::RandomPose,
        SynthesisMode::Interpolation,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeSampleConfig {
    /// Standard deviation of additive noise
    pub noise_std: f32,
    /// Half-width of the uniform range for random poses
    pub uniform_range: f32,
    /// Bounds of the interpolation weight
    pub mix_range: (f32, f32),
}

impl Default for NegativeSampleConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.1,
            uniform_range: 0.5,
            mix_range: (0.3, 0.7),
        }
    }
}

pub struct NegativeSampleSynthesizer {
    config: NegativeSampleConfig,
}

impl NegativeSampleSynthesizer {
    pub fn new(config: NegativeSampleConfig) -> Self {
        Self { config }
    }

    /// Default count: one third of the positives, rounded down.
    pub fn default_count(n_positive: usize) -> usize {
        n_positive / 3
    }

    /// Generate exactly `count` vectors. Returns an empty set when there are
    /// no positives to derive from.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        positives: &[Vec<f32>],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<f32>>> {
        let Some(first) = positives.first() else {
            return Ok(Vec::new());
        };
        let dim = first.len();

        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let mode = *SynthesisMode::ALL
                .choose(rng)
                .unwrap_or(&SynthesisMode::GaussianNoise);
            out.push(self.synthesize(mode, positives, dim, rng)?);
        }
        Ok(out)
    }

    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        mode: SynthesisMode,
        positives: &[Vec<f32>],
        dim: usize,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        match mode {
            SynthesisMode::Interpolation if positives.len() >= 2 => {
                let picked = index::sample(rng, positives.len(), 2);
                let (a, b) = (&positives[picked.index(0)], &positives[picked.index(1)]);
                let (lo, hi) = self.config.mix_range;
                let alpha: f32 = rng.gen_range(lo..hi);
                Ok(a.iter()
                    .zip(b)
                    .map(|(&x, &y)| alpha * x + (1.0 - alpha) * y)
                    .collect())
            }
            SynthesisMode::RandomPose => {
                let r = self.config.uniform_range;
                Ok((0..dim).map(|_| rng.gen_range(-r..r)).collect())
            }
            // interpolation needs two samples; fall back to noise
            SynthesisMode::GaussianNoise | SynthesisMode::Interpolation => {
                let base = &positives[rng.gen_range(0..positives.len())];
                let noise = Normal::new(0f32, self.config.noise_std)
                    .map_err(|e| Error::Msg(format!("Invalid noise std: {}", e)))?;
                Ok(base.iter().map(|&v| v + noise.sample(rng)).collect())
            }
        }
    }
}

impl Default for NegativeSampleSynthesizer {
    fn default() -> Self {
        Self::new(NegativeSampleConfig::default())
    }
}
