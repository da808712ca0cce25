//! Building blocks the voices are assembled from: automatable parameters,
//! oscillators, LFOs, gain and pan stages, noise sources, filters and reverb.
//!
//! Every node is owned by exactly one voice. Times are in seconds on the
//! context's render timeline; nodes compute one sample per call.

use std::collections::VecDeque;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};

use crate::dsp::{pan2, sine_wave, square_wave, NoiseColor, NoiseGenerator, Reverb};
use crate::error::NodeError;

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: f64,
    from: f32,
    end: f64,
    to: f32,
}

impl Segment {
    fn value_at(&self, t: f64) -> f32 {
        if self.end <= self.start {
            return self.to;
        }
        let alpha = ((t - self.start) / (self.end - self.start)).clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * alpha
    }
}

/// A value that can be set immediately or automated with linear ramps.
#[derive(Debug, Clone)]
pub struct Param {
    value: f32,
    last_time: f64,
    segments: VecDeque<Segment>,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            last_time: 0.0,
            segments: VecDeque::new(),
        }
    }

    /// Value as of the last rendered sample.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Target of the last scheduled automation, or the current value.
    pub fn target(&self) -> f32 {
        self.segments.back().map(|s| s.to).unwrap_or(self.value)
    }

    /// Time of the last rendered sample.
    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn has_automation(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Set immediately, dropping any automation.
    pub fn set_value(&mut self, value: f32) {
        self.segments.clear();
        self.value = value;
    }

    /// Drop automation and hold whatever value the param has at `t`.
    pub fn cancel_scheduled(&mut self, t: f64) {
        self.value = self.peek(t);
        self.segments.clear();
        self.last_time = self.last_time.max(t);
    }

    pub fn set_value_at(&mut self, value: f32, t: f64) {
        self.segments.push_back(Segment {
            start: t,
            from: value,
            end: t,
            to: value,
        });
    }

    /// Linear ramp from the previous event (or the last render time) to `end`.
    pub fn linear_ramp_to(&mut self, value: f32, end: f64) {
        let (start, from) = match self.segments.back() {
            Some(seg) => (seg.end, seg.to),
            None => (self.last_time, self.value),
        };
        self.segments.push_back(Segment {
            start,
            from,
            end: end.max(start),
            to: value,
        });
    }

    /// Cancel anything in flight and ramp from the current value.
    pub fn ramp_to(&mut self, value: f32, now: f64, duration: f64) {
        self.cancel_scheduled(now);
        self.segments.push_back(Segment {
            start: now,
            from: self.value,
            end: now + duration.max(0.0),
            to: value,
        });
    }

    fn peek(&self, t: f64) -> f32 {
        let mut value = self.value;
        for seg in &self.segments {
            if t >= seg.end {
                value = seg.to;
            } else if t >= seg.start {
                return seg.value_at(t);
            } else {
                break;
            }
        }
        value
    }

    /// Advance to `t` and return the value there.
    pub fn value_at(&mut self, t: f64) -> f32 {
        while let Some(seg) = self.segments.front().copied() {
            if t >= seg.end {
                self.value = seg.to;
                self.segments.pop_front();
            } else {
                if t >= seg.start {
                    self.value = seg.value_at(t);
                }
                break;
            }
        }
        self.last_time = t;
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Scheduled,
    Started,
    Stopped,
}

/// Start/stop bookkeeping shared by every source node.
#[derive(Debug, Clone, Default)]
struct Lifecycle {
    start_at: Option<f64>,
    stop_at: Option<f64>,
    disposed: bool,
}

impl Lifecycle {
    fn start(&mut self, t: f64) -> Result<(), NodeError> {
        if self.disposed {
            return Err(NodeError::AlreadyDisposed);
        }
        if self.start_at.is_some() {
            return Err(NodeError::InvalidState("source already started"));
        }
        self.start_at = Some(t);
        Ok(())
    }

    fn stop(&mut self, t: f64) -> Result<(), NodeError> {
        if self.disposed {
            return Err(NodeError::AlreadyDisposed);
        }
        let start = self
            .start_at
            .ok_or(NodeError::InvalidState("source never started"))?;
        let t = t.max(start);
        self.stop_at = Some(self.stop_at.map_or(t, |s| s.min(t)));
        Ok(())
    }

    fn dispose(&mut self) -> Result<(), NodeError> {
        if self.disposed {
            return Err(NodeError::AlreadyDisposed);
        }
        self.disposed = true;
        Ok(())
    }

    fn state_at(&self, t: f64) -> SourceState {
        match (self.start_at, self.stop_at) {
            _ if self.disposed => SourceState::Stopped,
            (None, _) => SourceState::Idle,
            (Some(_), Some(stop)) if t >= stop => SourceState::Stopped,
            (Some(start), _) if t < start => SourceState::Scheduled,
            _ => SourceState::Started,
        }
    }

    fn active_at(&self, t: f64) -> bool {
        self.state_at(t) == SourceState::Started
    }
}

/// Periodic source. Phase is zero at the start time.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    pub frequency: Param,
    phase: f64,
    life: Lifecycle,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32) -> Self {
        Self {
            waveform,
            frequency: Param::new(frequency),
            phase: 0.0,
            life: Lifecycle::default(),
        }
    }

    pub fn sine(frequency: f32) -> Self {
        Self::new(Waveform::Sine, frequency)
    }

    pub fn square(frequency: f32) -> Self {
        Self::new(Waveform::Square, frequency)
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn start(&mut self, t: f64) -> Result<(), NodeError> {
        self.life.start(t)
    }

    pub fn stop(&mut self, t: f64) -> Result<(), NodeError> {
        self.life.stop(t)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        self.life.dispose()
    }

    pub fn state_at(&self, t: f64) -> SourceState {
        self.life.state_at(t)
    }

    pub fn is_disposed(&self) -> bool {
        self.life.disposed
    }

    /// Next sample at time `t`. `freq_offset` is added to the frequency param,
    /// which is how an LFO modulates pitch.
    pub fn next(&mut self, t: f64, dt: f64, freq_offset: f32) -> f32 {
        let freq = self.frequency.value_at(t) + freq_offset;
        if !self.life.active_at(t) {
            return 0.0;
        }
        let phase = self.phase as f32;
        let out = match self.waveform {
            Waveform::Sine => sine_wave(phase),
            Waveform::Square => square_wave(phase),
        };
        self.phase = (self.phase + freq as f64 * dt).rem_euclid(1.0);
        out
    }
}

/// Low-frequency oscillator whose output spans `[min, max]`.
#[derive(Debug, Clone)]
pub struct Lfo {
    osc: Oscillator,
    min: f32,
    max: f32,
}

impl Lfo {
    pub fn new(frequency: f32, min: f32, max: f32) -> Self {
        Self {
            osc: Oscillator::sine(frequency),
            min,
            max,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.osc.frequency.value()
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    pub fn start(&mut self, t: f64) -> Result<(), NodeError> {
        self.osc.start(t)
    }

    pub fn stop(&mut self, t: f64) -> Result<(), NodeError> {
        self.osc.stop(t)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        self.osc.dispose()
    }

    pub fn state_at(&self, t: f64) -> SourceState {
        self.osc.state_at(t)
    }

    pub fn is_disposed(&self) -> bool {
        self.osc.is_disposed()
    }

    pub fn next(&mut self, t: f64, dt: f64) -> f32 {
        if !self.osc.life.active_at(t) {
            return 0.0;
        }
        let unit = (self.osc.next(t, dt, 0.0) + 1.0) * 0.5;
        self.min + (self.max - self.min) * unit
    }
}

#[derive(Debug, Clone)]
pub struct GainNode {
    pub gain: Param,
    disposed: bool,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: Param::new(gain),
            disposed: false,
        }
    }

    /// `modulation` is added to the gain param before it is applied.
    pub fn process(&mut self, input: f32, t: f64, modulation: f32) -> f32 {
        input * (self.gain.value_at(t) + modulation)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        if std::mem::replace(&mut self.disposed, true) {
            return Err(NodeError::AlreadyDisposed);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PannerNode {
    pub pan: Param,
    disposed: bool,
}

impl PannerNode {
    pub fn new(pan: f32) -> Self {
        Self {
            pan: Param::new(pan.clamp(-1.0, 1.0)),
            disposed: false,
        }
    }

    pub fn process(&mut self, input: f32, t: f64) -> (f32, f32) {
        pan2(input, self.pan.value_at(t))
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        if std::mem::replace(&mut self.disposed, true) {
            return Err(NodeError::AlreadyDisposed);
        }
        Ok(())
    }
}

pub struct NoiseSource {
    generator: NoiseGenerator,
    life: Lifecycle,
}

impl NoiseSource {
    pub fn new(color: NoiseColor) -> Self {
        Self::from_generator(NoiseGenerator::new(color))
    }

    pub fn from_generator(generator: NoiseGenerator) -> Self {
        Self {
            generator,
            life: Lifecycle::default(),
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.generator.color()
    }

    pub fn start(&mut self, t: f64) -> Result<(), NodeError> {
        self.life.start(t)
    }

    pub fn stop(&mut self, t: f64) -> Result<(), NodeError> {
        self.life.stop(t)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        self.life.dispose()
    }

    pub fn state_at(&self, t: f64) -> SourceState {
        self.life.state_at(t)
    }

    pub fn is_disposed(&self) -> bool {
        self.life.disposed
    }

    pub fn next(&mut self, t: f64) -> f32 {
        if self.life.active_at(t) {
            self.generator.next_sample()
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    BandPass,
}

const FILTER_UPDATE_INTERVAL: u32 = 32;

fn passthrough() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Biquad filter whose centre frequency is automatable and modulatable.
pub struct FilterNode {
    kind: FilterKind,
    pub frequency: Param,
    q: f32,
    sample_rate: f32,
    filter: DirectForm2Transposed<f32>,
    last_center: f32,
    countdown: u32,
    disposed: bool,
}

impl FilterNode {
    pub fn new(kind: FilterKind, frequency: f32, q: f32, sample_rate: f32) -> Self {
        let coeffs = Self::coefficients(kind, sample_rate, frequency, q).unwrap_or_else(passthrough);
        Self {
            kind,
            frequency: Param::new(frequency),
            q,
            sample_rate,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            last_center: frequency,
            countdown: FILTER_UPDATE_INTERVAL,
            disposed: false,
        }
    }

    fn coefficients(kind: FilterKind, sample_rate: f32, center: f32, q: f32) -> Option<Coefficients<f32>> {
        let ty = match kind {
            FilterKind::LowPass => biquad::Type::LowPass,
            FilterKind::BandPass => biquad::Type::BandPass,
        };
        let center = center.clamp(20.0, sample_rate * 0.45);
        Coefficients::<f32>::from_params(ty, sample_rate.hz(), center.hz(), q.max(0.1)).ok()
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Centre frequency used for the most recent coefficient update.
    pub fn current_center(&self) -> f32 {
        self.last_center
    }

    pub fn process(&mut self, input: f32, t: f64, freq_offset: f32) -> f32 {
        let center = self.frequency.value_at(t) + freq_offset;
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = FILTER_UPDATE_INTERVAL;
            if (center - self.last_center).abs() > 0.1 {
                if let Some(coeffs) = Self::coefficients(self.kind, self.sample_rate, center, self.q) {
                    self.filter.update_coefficients(coeffs);
                    self.last_center = center;
                }
            }
        }
        self.filter.run(input)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        if std::mem::replace(&mut self.disposed, true) {
            return Err(NodeError::AlreadyDisposed);
        }
        Ok(())
    }
}

pub struct ReverbNode {
    reverb: Reverb,
    disposed: bool,
}

impl ReverbNode {
    pub fn new(sample_rate: f32, decay_seconds: f32, wet: f32) -> Self {
        Self {
            reverb: Reverb::new(sample_rate, decay_seconds, wet),
            disposed: false,
        }
    }

    pub fn wet(&self) -> f32 {
        self.reverb.wet()
    }

    pub fn decay_seconds(&self) -> f32 {
        self.reverb.decay_seconds()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.reverb.process(input)
    }

    pub fn dispose(&mut self) -> Result<(), NodeError> {
        if std::mem::replace(&mut self.disposed, true) {
            return Err(NodeError::AlreadyDisposed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 1_000.0;

    #[test]
    fn ramp_reaches_target_linearly() {
        let mut p = Param::new(0.0);
        p.ramp_to(1.0, 0.0, 0.01);
        assert!((p.value_at(0.005) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(0.01), 1.0);
        assert_eq!(p.value_at(1.0), 1.0);
        assert!(!p.has_automation());
    }

    #[test]
    fn ramp_to_starts_from_the_current_value() {
        let mut p = Param::new(0.0);
        p.ramp_to(1.0, 0.0, 0.1);
        p.value_at(0.05);
        p.ramp_to(0.0, 0.05, 0.05);
        assert!((p.value_at(0.05) - 0.5).abs() < 1e-6);
        assert!((p.value_at(0.075) - 0.25).abs() < 1e-6);
        assert_eq!(p.value_at(0.1), 0.0);
    }

    #[test]
    fn cancel_holds_mid_ramp_value() {
        let mut p = Param::new(0.0);
        p.ramp_to(1.0, 0.0, 1.0);
        p.cancel_scheduled(0.25);
        assert!((p.value() - 0.25).abs() < 1e-6);
        assert_eq!(p.value_at(2.0), p.value());
    }

    #[test]
    fn set_value_at_then_linear_ramp() {
        let mut p = Param::new(0.3);
        p.set_value_at(0.0, 1.0);
        p.linear_ramp_to(0.8, 1.05);
        assert_eq!(p.value_at(0.5), 0.3);
        assert_eq!(p.value_at(1.0), 0.0);
        assert!((p.value_at(1.025) - 0.4).abs() < 1e-5);
        assert_eq!(p.target(), 0.8);
    }

    #[test]
    fn oscillator_starts_at_phase_zero_and_stops() {
        let mut osc = Oscillator::sine(250.0);
        assert_eq!(osc.state_at(0.0), SourceState::Idle);
        osc.start(0.0).unwrap();
        let first = osc.next(0.0, 1.0 / SR, 0.0);
        assert!(first.abs() < 1e-6);
        let second = osc.next(1.0 / SR, 1.0 / SR, 0.0);
        assert!((second - 1.0).abs() < 1e-5, "quarter cycle in, got {second}");
        osc.stop(0.5).unwrap();
        assert_eq!(osc.state_at(0.4), SourceState::Started);
        assert_eq!(osc.state_at(0.5), SourceState::Stopped);
        assert_eq!(osc.next(0.6, 1.0 / SR, 0.0), 0.0);
    }

    #[test]
    fn oscillator_rejects_double_start_and_double_dispose() {
        let mut osc = Oscillator::square(2.0);
        assert!(matches!(osc.stop(0.0), Err(NodeError::InvalidState(_))));
        osc.start(0.0).unwrap();
        assert!(matches!(osc.start(0.1), Err(NodeError::InvalidState(_))));
        osc.dispose().unwrap();
        assert_eq!(osc.dispose(), Err(NodeError::AlreadyDisposed));
        assert_eq!(osc.start(0.0), Err(NodeError::AlreadyDisposed));
    }

    #[test]
    fn earliest_stop_wins() {
        let mut osc = Oscillator::sine(10.0);
        osc.start(0.0).unwrap();
        osc.stop(0.3).unwrap();
        osc.stop(0.6).unwrap();
        assert_eq!(osc.state_at(0.35), SourceState::Stopped);
    }

    #[test]
    fn lfo_stays_inside_its_range() {
        let mut lfo = Lfo::new(4.5, -50.0, 50.0);
        lfo.start(0.0).unwrap();
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for i in 0..1000 {
            let v = lfo.next(i as f64 / SR, 1.0 / SR);
            lo = lo.min(v);
            hi = hi.max(v);
        }
        assert!(lo >= -50.0 - 1e-3 && hi <= 50.0 + 1e-3);
        assert!(hi - lo > 95.0);
    }

    #[test]
    fn lowpass_attenuates_high_frequencies() {
        let sr = 48_000.0;
        let mut filter = FilterNode::new(FilterKind::LowPass, 300.0, 0.7, sr);
        let mut osc = Oscillator::sine(8_000.0);
        osc.start(0.0).unwrap();
        let dt = 1.0 / sr as f64;
        let mut peak = 0.0f32;
        for i in 0..4800 {
            let t = i as f64 * dt;
            let y = filter.process(osc.next(t, dt, 0.0), t, 0.0);
            if i > 2400 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.05, "peak {peak}");
    }

    #[test]
    fn filter_follows_modulated_centre() {
        let mut filter = FilterNode::new(FilterKind::BandPass, 2000.0, 4.0, 48_000.0);
        for i in 0..64 {
            filter.process(0.0, i as f64 / 48_000.0, 500.0);
        }
        assert!((filter.current_center() - 2500.0).abs() < 1.0);
    }
}
