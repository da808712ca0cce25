use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

/// Streaming colored-noise source producing samples roughly in [-1, 1].
pub struct NoiseGenerator {
    color: NoiseColor,
    rng: StdRng,
    // pink filter state
    b0: f32,
    b1: f32,
    b2: f32,
    b3: f32,
    b4: f32,
    b5: f32,
    b6: f32,
    // brown integrator
    brown: f32,
}

impl NoiseGenerator {
    pub fn new(color: NoiseColor) -> Self {
        Self::with_rng(color, StdRng::from_entropy())
    }

    /// Deterministic generator for tests and reproducible renders.
    pub fn seeded(color: NoiseColor, seed: u64) -> Self {
        Self::with_rng(color, StdRng::seed_from_u64(seed))
    }

    fn with_rng(color: NoiseColor, rng: StdRng) -> Self {
        Self {
            color,
            rng,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            b3: 0.0,
            b4: 0.0,
            b5: 0.0,
            b6: 0.0,
            brown: 0.0,
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    pub fn next_sample(&mut self) -> f32 {
        let w = self.rng.gen::<f32>() * 2.0 - 1.0;
        match self.color {
            NoiseColor::White => w,
            NoiseColor::Pink => {
                // Paul Kellet's refined pink filter
                self.b0 = 0.99886 * self.b0 + w * 0.0555179;
                self.b1 = 0.99332 * self.b1 + w * 0.0750759;
                self.b2 = 0.96900 * self.b2 + w * 0.1538520;
                self.b3 = 0.86650 * self.b3 + w * 0.3104856;
                self.b4 = 0.55000 * self.b4 + w * 0.5329522;
                self.b5 = -0.7616 * self.b5 - w * 0.0168980;
                let out = self.b0 + self.b1 + self.b2 + self.b3 + self.b4 + self.b5 + self.b6 + w * 0.5362;
                self.b6 = w * 0.115926;
                (out * 0.11).clamp(-1.0, 1.0)
            }
            NoiseColor::Brown => {
                // leaky integrator keeps the walk bounded
                self.brown = (self.brown + 0.02 * w) / 1.02;
                (self.brown * 3.5).clamp(-1.0, 1.0)
            }
        }
    }

    pub fn fill(&mut self, out: &mut [f32]) {
        for v in out.iter_mut() {
            *v = self.next_sample();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(color: NoiseColor) -> (f32, f32) {
        let mut gen = NoiseGenerator::seeded(color, 7);
        let mut buf = vec![0.0f32; 48_000];
        gen.fill(&mut buf);
        let peak = buf.iter().fold(0.0f32, |a, b| a.max(b.abs()));
        let rms = (buf.iter().map(|v| v * v).sum::<f32>() / buf.len() as f32).sqrt();
        (peak, rms)
    }

    #[test]
    fn every_color_is_bounded_and_audible() {
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            let (peak, rms) = stats(color);
            assert!(peak <= 1.0, "{color:?} peak {peak}");
            assert!(rms > 0.01, "{color:?} rms {rms}");
        }
    }

    #[test]
    fn brown_noise_moves_slower_than_white() {
        let diff = |color| {
            let mut gen = NoiseGenerator::seeded(color, 3);
            let mut buf = vec![0.0f32; 4096];
            gen.fill(&mut buf);
            buf.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f32>() / buf.len() as f32
        };
        assert!(diff(NoiseColor::Brown) < diff(NoiseColor::White) * 0.5);
    }
}
