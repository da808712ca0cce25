use crate::composite::carrier::LayerState;
use crate::composite::presets::IsochronicLayerConfig;
use crate::error::NodeError;
use crate::graph::{GainNode, Oscillator, SourceState};

/// Oscillators stop this long after a stop request.
pub const PULSE_STOP_DELAY: f64 = 0.1;

/// Base gain and modulation depth for a pulsed tone. The gain swings between
/// `center - depth` and `center + depth` and never leaves `[0, volume]`.
pub fn pulse_levels(volume: f32, duty_cycle: f32) -> (f32, f32) {
    let center = volume * duty_cycle;
    let depth = center.min(volume - center);
    (center, depth)
}

/// A sine tone amplitude-modulated by a square wave at the pulse rate.
pub struct IsochronicLayer {
    config: IsochronicLayerConfig,
    tone: Oscillator,
    pulse: Oscillator,
    depth: GainNode,
    gain: GainNode,
    state: LayerState,
}

impl IsochronicLayer {
    pub fn new(config: IsochronicLayerConfig) -> Self {
        let (center, depth) = pulse_levels(config.volume, config.duty_cycle);
        Self {
            tone: Oscillator::sine(config.frequency),
            pulse: Oscillator::square(config.pulse_rate),
            depth: GainNode::new(depth),
            gain: GainNode::new(center),
            config,
            state: LayerState::Idle,
        }
    }

    pub fn config(&self) -> &IsochronicLayerConfig {
        &self.config
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn oscillators(&self) -> [&Oscillator; 2] {
        [&self.tone, &self.pulse]
    }

    /// Current `(center, depth)`.
    pub fn levels(&self) -> (f32, f32) {
        (self.gain.gain.target(), self.depth.gain.target())
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        if self.state == LayerState::Playing {
            return errors;
        }
        if self.tone.state_at(now) != SourceState::Idle {
            self.tone = Oscillator::sine(self.config.frequency);
            self.pulse = Oscillator::square(self.config.pulse_rate);
        }
        errors.extend(self.tone.start(now).err());
        errors.extend(self.pulse.start(now).err());
        self.state = LayerState::Playing;
        errors
    }

    pub fn stop(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        if self.state == LayerState::Idle {
            return errors;
        }
        errors.extend(self.tone.stop(now + PULSE_STOP_DELAY).err());
        errors.extend(self.pulse.stop(now + PULSE_STOP_DELAY).err());
        self.state = LayerState::Idle;
        errors
    }

    /// Recompute the levels for a new volume, keeping the duty cycle.
    pub fn set_volume(&mut self, volume: f32, now: f64) {
        let (center, depth) = pulse_levels(volume, self.config.duty_cycle);
        self.gain.gain.cancel_scheduled(now);
        self.depth.gain.set_value(depth);
        self.gain.gain.set_value_at(center, now);
        self.config.volume = volume;
    }

    pub fn dispose(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = self.stop(now);
        errors.extend(self.tone.dispose().err());
        errors.extend(self.pulse.dispose().err());
        errors.extend(self.depth.dispose().err());
        errors.extend(self.gain.dispose().err());
        errors
    }

    pub fn live_sources(&self) -> usize {
        [&self.tone, &self.pulse]
            .iter()
            .filter(|o| !o.is_disposed())
            .count()
    }

    pub fn next(&mut self, t: f64, dt: f64) -> f32 {
        let modulation = self.depth.process(self.pulse.next(t, dt, 0.0), t, 0.0);
        let tone = self.tone.next(t, dt, 0.0);
        self.gain.process(tone, t, modulation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_duty_cycle() {
        assert_eq!(pulse_levels(0.25, 0.5), (0.125, 0.125));
        let (center, depth) = pulse_levels(0.15, 0.4);
        assert!((center - 0.06).abs() < 1e-6);
        assert!((depth - 0.06).abs() < 1e-6);
        let (center, depth) = pulse_levels(0.3, 0.8);
        assert!((center - 0.24).abs() < 1e-6);
        assert!((depth - 0.06).abs() < 1e-6);
    }

    #[test]
    fn gain_alternates_between_zero_and_volume() {
        let sr = 8_000.0;
        let dt = 1.0 / sr;
        let mut layer = IsochronicLayer::new(IsochronicLayerConfig {
            frequency: 400.0,
            pulse_rate: 5.0,
            duty_cycle: 0.5,
            volume: 0.25,
        });
        layer.start(0.0);
        // first half of each pulse period is loud, second half silent
        let mut loud = 0.0f32;
        let mut quiet = 0.0f32;
        for i in 0..(sr as usize / 5) {
            let t = i as f64 * dt;
            let y = layer.next(t, dt).abs();
            if i < 790 {
                loud = loud.max(y);
            } else if i > 810 {
                quiet = quiet.max(y);
            }
        }
        assert!((loud - 0.25).abs() < 0.01, "loud {loud}");
        assert!(quiet < 1e-6, "quiet {quiet}");
    }

    #[test]
    fn set_volume_recomputes_levels() {
        let mut layer = IsochronicLayer::new(IsochronicLayerConfig {
            frequency: 7.83,
            pulse_rate: 7.83,
            duty_cycle: 0.5,
            volume: 0.3,
        });
        layer.set_volume(0.6, 0.0);
        assert_eq!(layer.levels(), (0.3, 0.3));
        assert_eq!(layer.config().volume, 0.6);
    }

    #[test]
    fn stop_is_delayed_and_idempotent() {
        let mut layer = IsochronicLayer::new(IsochronicLayerConfig {
            frequency: 10.0,
            pulse_rate: 5.0,
            duty_cycle: 0.4,
            volume: 0.15,
        });
        assert!(layer.stop(0.0).is_empty());
        layer.start(0.0);
        layer.stop(1.0);
        assert_eq!(layer.state(), LayerState::Idle);
        assert_eq!(layer.oscillators()[0].state_at(1.05), SourceState::Started);
        assert_eq!(layer.oscillators()[1].state_at(1.1), SourceState::Stopped);
    }
}
