use crate::composite::presets::CarrierLayerConfig;
use crate::error::NodeError;
use crate::graph::{GainNode, Oscillator, SourceState};

/// Fade applied when a layer starts or stops.
pub const LAYER_FADE: f64 = 0.05;
/// Oscillators stop this long after a stop request, once the fade is done.
pub const LAYER_STOP_DELAY: f64 = 0.06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Idle,
    Playing,
}

/// One binaural pair. The left oscillator only reaches the left channel and
/// the right oscillator only the right.
pub struct CarrierLayer {
    config: CarrierLayerConfig,
    left: Oscillator,
    right: Oscillator,
    left_gain: GainNode,
    right_gain: GainNode,
    state: LayerState,
}

impl CarrierLayer {
    pub fn new(config: CarrierLayerConfig) -> Self {
        Self {
            left: Oscillator::sine(config.left_freq),
            right: Oscillator::sine(config.right_freq),
            left_gain: GainNode::new(0.0),
            right_gain: GainNode::new(0.0),
            config,
            state: LayerState::Idle,
        }
    }

    pub fn config(&self) -> &CarrierLayerConfig {
        &self.config
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn oscillators(&self) -> [&Oscillator; 2] {
        [&self.left, &self.right]
    }

    pub fn gain_targets(&self) -> [f32; 2] {
        [self.left_gain.gain.target(), self.right_gain.gain.target()]
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        if self.state == LayerState::Playing {
            return errors;
        }
        // A stopped oscillator cannot be started again; restart on fresh ones.
        if self.left.state_at(now) != SourceState::Idle {
            self.left = Oscillator::sine(self.config.left_freq);
            self.right = Oscillator::sine(self.config.right_freq);
        }
        errors.extend(self.left.start(now).err());
        errors.extend(self.right.start(now).err());
        for gain in [&mut self.left_gain, &mut self.right_gain] {
            gain.gain.cancel_scheduled(now);
            gain.gain.set_value_at(0.0, now);
            gain.gain.linear_ramp_to(self.config.volume, now + LAYER_FADE);
        }
        self.state = LayerState::Playing;
        errors
    }

    pub fn stop(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        if self.state == LayerState::Idle {
            return errors;
        }
        for gain in [&mut self.left_gain, &mut self.right_gain] {
            gain.gain.cancel_scheduled(now);
            let current = gain.gain.value();
            gain.gain.set_value_at(current, now);
            gain.gain.linear_ramp_to(0.0, now + LAYER_FADE);
        }
        errors.extend(self.left.stop(now + LAYER_STOP_DELAY).err());
        errors.extend(self.right.stop(now + LAYER_STOP_DELAY).err());
        self.state = LayerState::Idle;
        errors
    }

    /// Snap both channels to `volume`, dropping any fade in flight.
    pub fn set_volume(&mut self, volume: f32, now: f64) {
        for gain in [&mut self.left_gain, &mut self.right_gain] {
            gain.gain.cancel_scheduled(now);
            gain.gain.set_value_at(volume, now);
        }
        self.config.volume = volume;
    }

    pub fn dispose(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = self.stop(now);
        errors.extend(self.left.dispose().err());
        errors.extend(self.right.dispose().err());
        errors.extend(self.left_gain.dispose().err());
        errors.extend(self.right_gain.dispose().err());
        errors
    }

    pub fn live_sources(&self) -> usize {
        [&self.left, &self.right]
            .iter()
            .filter(|o| !o.is_disposed())
            .count()
    }

    pub fn next(&mut self, t: f64, dt: f64) -> (f32, f32) {
        let l = self.left.next(t, dt, 0.0);
        let r = self.right.next(t, dt, 0.0);
        (
            self.left_gain.process(l, t, 0.0),
            self.right_gain.process(r, t, 0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 8_000.0;

    fn layer() -> CarrierLayer {
        CarrierLayer::new(CarrierLayerConfig {
            left_freq: 100.0,
            right_freq: 105.0,
            volume: 0.8,
            phase: 0.0,
        })
    }

    fn run(layer: &mut CarrierLayer, from: f64, to: f64) -> (f32, f32) {
        let mut peak = (0.0f32, 0.0f32);
        let mut t = from;
        while t < to {
            let (l, r) = layer.next(t, DT);
            peak = (peak.0.max(l.abs()), peak.1.max(r.abs()));
            t += DT;
        }
        peak
    }

    #[test]
    fn start_fades_in_to_layer_volume() {
        let mut layer = layer();
        assert!(layer.start(0.0).is_empty());
        assert_eq!(layer.state(), LayerState::Playing);
        let (early_l, _) = run(&mut layer, 0.0, 0.01);
        assert!(early_l < 0.3);
        let (l, r) = run(&mut layer, 0.01, 0.2);
        assert!((l - 0.8).abs() < 0.02 && (r - 0.8).abs() < 0.02);
    }

    #[test]
    fn stop_fades_then_silences_and_repeats_are_noops() {
        let mut layer = layer();
        layer.start(0.0);
        run(&mut layer, 0.0, 0.1);
        assert!(layer.stop(0.1).is_empty());
        assert!(layer.stop(0.1).is_empty());
        assert_eq!(layer.state(), LayerState::Idle);
        assert_eq!(layer.gain_targets(), [0.0, 0.0]);
        run(&mut layer, 0.1, 0.16);
        assert_eq!(run(&mut layer, 0.16, 0.3), (0.0, 0.0));
        assert_eq!(layer.oscillators()[0].state_at(0.16), SourceState::Stopped);
    }

    #[test]
    fn set_volume_snaps_without_ramp() {
        let mut layer = layer();
        layer.start(0.0);
        layer.set_volume(0.2, 0.01);
        assert_eq!(layer.gain_targets(), [0.2, 0.2]);
        assert_eq!(layer.config().volume, 0.2);
        let (l, _) = run(&mut layer, 0.01, 0.2);
        assert!((l - 0.2).abs() < 0.01);
    }

    #[test]
    fn restart_after_stop_uses_fresh_oscillators() {
        let mut layer = layer();
        layer.start(0.0);
        layer.stop(0.1);
        run(&mut layer, 0.0, 0.2);
        assert!(layer.start(0.2).is_empty());
        let (l, r) = run(&mut layer, 0.2, 0.4);
        assert!(l > 0.7 && r > 0.7);
    }

    #[test]
    fn dispose_reports_second_dispose() {
        let mut layer = layer();
        layer.start(0.0);
        assert!(layer.dispose(0.0).is_empty());
        assert_eq!(layer.live_sources(), 0);
        let errors = layer.dispose(0.0);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| *e == NodeError::AlreadyDisposed));
    }
}
