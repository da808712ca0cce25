pub mod noise;
pub mod reverb;

use std::f32::consts::{FRAC_PI_4, TAU};

pub use noise::{NoiseColor, NoiseGenerator};
pub use reverb::Reverb;

/// Gain used for "silent" decibel settings.
pub const SILENCE_DB: f32 = -60.0;

pub fn sine_wave(phase: f32) -> f32 {
    (TAU * phase).sin()
}

/// Bipolar square wave for a phase in cycles.
pub fn square_wave(phase: f32) -> f32 {
    if phase.rem_euclid(1.0) < 0.5 {
        1.0
    } else {
        -1.0
    }
}

/// Equal-power pan of a mono signal. `pan` is clamped to [-1, 1].
pub fn pan2(signal: f32, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos() * signal, angle.sin() * signal)
}

pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan2_is_equal_power() {
        for pan in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = pan2(1.0, pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
        let (l, r) = pan2(1.0, -1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
    }

    #[test]
    fn decibel_conversions_invert() {
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert!((db_to_gain(-12.0) - 0.2512).abs() < 1e-3);
        assert!((db_to_gain(gain_to_db(0.37)) - 0.37).abs() < 1e-5);
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn square_wave_duty_is_half() {
        assert_eq!(square_wave(0.1), 1.0);
        assert_eq!(square_wave(0.6), -1.0);
        assert_eq!(square_wave(1.1), 1.0);
    }
}
