//! Schroeder reverb: four parallel damped combs into two series allpasses.
//!
//! The comb feedback is derived from a decay time (RT60) so that the tail
//! falls by 60 dB after `decay_seconds`.

/// Comb delays in milliseconds, mutually prime at common rates.
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
const ALLPASS_FEEDBACK: f32 = 0.7;
const DAMPING: f32 = 0.2;

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    filter_state: f32,
}

impl Comb {
    fn new(delay: usize, feedback: f32) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
            feedback,
            filter_state: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;
        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = -ALLPASS_FEEDBACK * input + delayed;
        self.buffer[self.pos] = input + ALLPASS_FEEDBACK * output;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

pub struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    wet: f32,
    decay_seconds: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32, decay_seconds: f32, wet: f32) -> Self {
        let decay = decay_seconds.max(0.01);
        let combs = COMB_DELAYS_MS
            .iter()
            .map(|ms| {
                let delay_s = ms / 1000.0;
                let feedback = 10f32.powf(-3.0 * delay_s / decay).min(0.98);
                Comb::new((delay_s * sample_rate) as usize, feedback)
            })
            .collect();
        let allpasses = ALLPASS_DELAYS_MS
            .iter()
            .map(|ms| Allpass::new((ms / 1000.0 * sample_rate) as usize))
            .collect();
        Self {
            combs,
            allpasses,
            wet: wet.clamp(0.0, 1.0),
            decay_seconds: decay,
        }
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    pub fn decay_seconds(&self) -> f32 {
        self.decay_seconds
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let mut acc = 0.0;
        for comb in &mut self.combs {
            acc += comb.process(input);
        }
        let mut tail = acc * 0.25;
        for ap in &mut self.allpasses {
            tail = ap.process(tail);
        }
        input * (1.0 - self.wet) + tail * self.wet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_path_passes_through_immediately() {
        let mut rev = Reverb::new(48_000.0, 2.0, 0.3);
        let out = rev.process(1.0);
        assert!((out - 0.7).abs() < 1e-6);
    }

    #[test]
    fn impulse_leaves_a_decaying_tail() {
        let sr = 8_000.0;
        let mut rev = Reverb::new(sr, 2.0, 1.0);
        let mut out = vec![rev.process(1.0)];
        for _ in 0..(sr as usize * 3) {
            out.push(rev.process(0.0));
        }
        let energy = |range: std::ops::Range<usize>| out[range].iter().map(|v| v * v).sum::<f32>();
        let early = energy(400..4_000);
        let late = energy(16_000..20_000);
        assert!(early > 0.0);
        assert!(late < early);
        assert!(late > 0.0, "tail should still ring after two seconds");
    }
}
