//! Renderable voice bodies. Each voice exclusively owns its nodes and is
//! driven sample by sample by the render context.

use crate::ambient::BedRecipe;
use crate::composite::carrier::CarrierLayer;
use crate::composite::isochronic::IsochronicLayer;
use crate::composite::presets::CompositeSignalConfig;
use crate::dsp::NoiseColor;
use crate::error::NodeError;
use crate::graph::{
    FilterKind, FilterNode, GainNode, Lfo, NoiseSource, Oscillator, PannerNode, Param,
    ReverbNode, SourceState, Waveform,
};

pub trait Voice: Send {
    /// Add interleaved stereo frames into `output`. The first frame is at `time`.
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64);
    /// Schedule every source to stop at `at`.
    fn stop_sources(&mut self, at: f64) -> Vec<NodeError>;
    fn dispose(&mut self) -> Vec<NodeError>;
    /// Source nodes that have not been disposed yet.
    fn live_sources(&self) -> usize;
    fn snapshot(&self, time: f64) -> VoiceSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorInfo {
    pub waveform: Waveform,
    pub frequency: f32,
    pub state: SourceState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoInfo {
    pub frequency: f32,
    pub min: f32,
    pub max: f32,
    pub state: SourceState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInfo {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
}

/// Read-only view of a voice's graph, used for inspection and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceSnapshot {
    /// Audible oscillators only; modulators are listed in `lfos`.
    pub oscillators: Vec<OscillatorInfo>,
    pub lfos: Vec<LfoInfo>,
    /// Where each output gain is heading.
    pub gain_targets: Vec<f32>,
    pub pans: Vec<f32>,
    pub noise: Option<NoiseColor>,
    pub filter: Option<FilterInfo>,
    /// `(decay seconds, wet)`.
    pub reverb: Option<(f32, f32)>,
}

fn osc_info(osc: &Oscillator, time: f64) -> OscillatorInfo {
    OscillatorInfo {
        waveform: osc.waveform(),
        frequency: osc.frequency.value(),
        state: osc.state_at(time),
    }
}

fn push_err(errors: &mut Vec<NodeError>, result: Result<(), NodeError>) {
    if let Err(err) = result {
        errors.push(err);
    }
}

/// Sub-10 Hz targets: a single carrier whose pitch is swept by an LFO.
pub struct CarrierModulationVoice {
    pub carrier: Oscillator,
    pub lfo: Lfo,
    pub gain: GainNode,
    pub panner: PannerNode,
}

impl CarrierModulationVoice {
    pub fn new(carrier_freq: f32, rate: f32, depth: f32, pan: f32) -> Self {
        Self {
            carrier: Oscillator::sine(carrier_freq),
            lfo: Lfo::new(rate, -depth, depth),
            gain: GainNode::new(0.0),
            panner: PannerNode::new(pan),
        }
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.lfo.start(now));
        push_err(&mut errors, self.carrier.start(now));
        errors
    }
}

impl Voice for CarrierModulationVoice {
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64) {
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            let t = time + i as f64 * dt;
            let sweep = self.lfo.next(t, dt);
            let s = self.carrier.next(t, dt, sweep);
            let s = self.gain.process(s, t, 0.0);
            let (l, r) = self.panner.process(s, t);
            frame[0] += l;
            frame[1] += r;
        }
    }

    fn stop_sources(&mut self, at: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.carrier.stop(at));
        push_err(&mut errors, self.lfo.stop(at));
        errors
    }

    fn dispose(&mut self) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.carrier.dispose());
        push_err(&mut errors, self.lfo.dispose());
        push_err(&mut errors, self.gain.dispose());
        push_err(&mut errors, self.panner.dispose());
        errors
    }

    fn live_sources(&self) -> usize {
        usize::from(!self.carrier.is_disposed()) + usize::from(!self.lfo.is_disposed())
    }

    fn snapshot(&self, time: f64) -> VoiceSnapshot {
        let (min, max) = self.lfo.range();
        VoiceSnapshot {
            oscillators: vec![osc_info(&self.carrier, time)],
            lfos: vec![LfoInfo {
                frequency: self.lfo.frequency(),
                min,
                max,
                state: self.lfo.state_at(time),
            }],
            gain_targets: vec![self.gain.gain.target()],
            pans: vec![self.panner.pan.target()],
            ..VoiceSnapshot::default()
        }
    }
}

/// Oscillator, gain and panner feeding one ear of a binaural pair.
pub struct EarChannel {
    pub osc: Oscillator,
    pub gain: GainNode,
    pub panner: PannerNode,
}

impl EarChannel {
    fn new(freq: f32, pan: f32) -> Self {
        Self {
            osc: Oscillator::sine(freq),
            gain: GainNode::new(0.0),
            panner: PannerNode::new(pan),
        }
    }

    fn next(&mut self, t: f64, dt: f64) -> (f32, f32) {
        let s = self.osc.next(t, dt, 0.0);
        let s = self.gain.process(s, t, 0.0);
        self.panner.process(s, t)
    }

    fn dispose(&mut self, errors: &mut Vec<NodeError>) {
        push_err(errors, self.osc.dispose());
        push_err(errors, self.gain.dispose());
        push_err(errors, self.panner.dispose());
    }
}

/// Two pure tones, one per ear, whose difference is the beat frequency.
pub struct BinauralVoice {
    pub left: EarChannel,
    pub right: EarChannel,
}

impl BinauralVoice {
    pub fn new(left_freq: f32, right_freq: f32, pan: f32) -> Self {
        let (left_pan, right_pan) = Self::ear_pans(pan);
        Self {
            left: EarChannel::new(left_freq, left_pan),
            right: EarChannel::new(right_freq, right_pan),
        }
    }

    /// Both ears shift together, each clamped at its own edge.
    pub fn ear_pans(pan: f32) -> (f32, f32) {
        ((-1.0 + pan).max(-1.0), (1.0 + pan).min(1.0))
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.left.osc.start(now));
        push_err(&mut errors, self.right.osc.start(now));
        errors
    }
}

impl Voice for BinauralVoice {
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64) {
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            let t = time + i as f64 * dt;
            let (ll, lr) = self.left.next(t, dt);
            let (rl, rr) = self.right.next(t, dt);
            frame[0] += ll + rl;
            frame[1] += lr + rr;
        }
    }

    fn stop_sources(&mut self, at: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.left.osc.stop(at));
        push_err(&mut errors, self.right.osc.stop(at));
        errors
    }

    fn dispose(&mut self) -> Vec<NodeError> {
        let mut errors = Vec::new();
        self.left.dispose(&mut errors);
        self.right.dispose(&mut errors);
        errors
    }

    fn live_sources(&self) -> usize {
        usize::from(!self.left.osc.is_disposed()) + usize::from(!self.right.osc.is_disposed())
    }

    fn snapshot(&self, time: f64) -> VoiceSnapshot {
        VoiceSnapshot {
            oscillators: vec![osc_info(&self.left.osc, time), osc_info(&self.right.osc, time)],
            gain_targets: vec![self.left.gain.gain.target(), self.right.gain.gain.target()],
            pans: vec![self.left.panner.pan.target(), self.right.panner.pan.target()],
            ..VoiceSnapshot::default()
        }
    }
}

/// noise -> [filter] -> gain -> reverb, mono to both channels.
pub struct AmbientVoice {
    recipe: BedRecipe,
    pub noise: NoiseSource,
    pub filter: Option<FilterNode>,
    pub lfo: Option<Lfo>,
    pub gain: GainNode,
    pub reverb: ReverbNode,
}

impl AmbientVoice {
    pub fn new(recipe: BedRecipe, noise: NoiseSource, reverb: ReverbNode, sample_rate: f32) -> Self {
        let mut filter = recipe
            .filter
            .map(|f| FilterNode::new(f.kind, f.frequency, f.q, sample_rate));
        let lfo = recipe.lfo.map(|l| Lfo::new(l.frequency, l.min, l.max));
        // A sweeping LFO owns the centre frequency outright.
        if let (Some(filter), Some(_)) = (filter.as_mut(), lfo.as_ref()) {
            filter.frequency.set_value(0.0);
        }
        Self {
            recipe,
            noise,
            filter,
            lfo,
            gain: GainNode::new(0.0),
            reverb,
        }
    }

    pub fn recipe(&self) -> &BedRecipe {
        &self.recipe
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.noise.start(now));
        if let Some(lfo) = self.lfo.as_mut() {
            push_err(&mut errors, lfo.start(now));
        }
        errors
    }
}

impl Voice for AmbientVoice {
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64) {
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            let t = time + i as f64 * dt;
            let mut s = self.noise.next(t);
            if let Some(filter) = self.filter.as_mut() {
                let sweep = self.lfo.as_mut().map_or(0.0, |l| l.next(t, dt));
                s = filter.process(s, t, sweep);
            }
            let s = self.reverb.process(self.gain.process(s, t, 0.0));
            frame[0] += s;
            frame[1] += s;
        }
    }

    fn stop_sources(&mut self, at: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.noise.stop(at));
        if let Some(lfo) = self.lfo.as_mut() {
            push_err(&mut errors, lfo.stop(at));
        }
        errors
    }

    fn dispose(&mut self) -> Vec<NodeError> {
        let mut errors = Vec::new();
        push_err(&mut errors, self.noise.dispose());
        if let Some(filter) = self.filter.as_mut() {
            push_err(&mut errors, filter.dispose());
        }
        if let Some(lfo) = self.lfo.as_mut() {
            push_err(&mut errors, lfo.dispose());
        }
        push_err(&mut errors, self.gain.dispose());
        push_err(&mut errors, self.reverb.dispose());
        errors
    }

    fn live_sources(&self) -> usize {
        usize::from(!self.noise.is_disposed())
            + self.lfo.as_ref().map_or(0, |l| usize::from(!l.is_disposed()))
    }

    fn snapshot(&self, time: f64) -> VoiceSnapshot {
        VoiceSnapshot {
            lfos: self
                .lfo
                .iter()
                .map(|l| {
                    let (min, max) = l.range();
                    LfoInfo {
                        frequency: l.frequency(),
                        min,
                        max,
                        state: l.state_at(time),
                    }
                })
                .collect(),
            gain_targets: vec![self.gain.gain.target()],
            noise: Some(self.noise.color()),
            filter: self.recipe.filter.map(|f| FilterInfo {
                kind: f.kind,
                frequency: f.frequency,
                q: f.q,
            }),
            reverb: Some((self.reverb.decay_seconds(), self.reverb.wet())),
            ..VoiceSnapshot::default()
        }
    }
}

/// Every layer of one preset summed into a preset-level gain.
pub struct CompositeVoice {
    config: CompositeSignalConfig,
    pub master: GainNode,
    pub carriers: Vec<CarrierLayer>,
    pub isochronic: Vec<IsochronicLayer>,
}

impl CompositeVoice {
    pub fn new(config: &CompositeSignalConfig, master_gain: f32) -> Self {
        Self {
            carriers: config.carrier_layers.iter().copied().map(CarrierLayer::new).collect(),
            isochronic: config
                .isochronic_layers
                .iter()
                .copied()
                .map(IsochronicLayer::new)
                .collect(),
            master: GainNode::new(master_gain),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &CompositeSignalConfig {
        &self.config
    }

    /// Start every layer at the same instant.
    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        for layer in &mut self.carriers {
            errors.extend(layer.start(now));
        }
        for layer in &mut self.isochronic {
            errors.extend(layer.start(now));
        }
        errors
    }

    pub fn stop(&mut self, now: f64) -> Vec<NodeError> {
        let mut errors = Vec::new();
        for layer in &mut self.carriers {
            errors.extend(layer.stop(now));
        }
        for layer in &mut self.isochronic {
            errors.extend(layer.stop(now));
        }
        errors
    }

    pub fn master_gain(&mut self) -> &mut Param {
        &mut self.master.gain
    }
}

impl Voice for CompositeVoice {
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64) {
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            let t = time + i as f64 * dt;
            let (mut l, mut r) = (0.0, 0.0);
            for layer in &mut self.carriers {
                let (cl, cr) = layer.next(t, dt);
                l += cl;
                r += cr;
            }
            for layer in &mut self.isochronic {
                let s = layer.next(t, dt);
                l += s;
                r += s;
            }
            frame[0] += self.master.process(l, t, 0.0);
            frame[1] += self.master.process(r, t, 0.0);
        }
    }

    fn stop_sources(&mut self, at: f64) -> Vec<NodeError> {
        self.stop(at)
    }

    fn dispose(&mut self) -> Vec<NodeError> {
        let mut errors = Vec::new();
        let now = self.master.gain.last_time();
        for layer in &mut self.carriers {
            errors.extend(layer.dispose(now));
        }
        for layer in &mut self.isochronic {
            errors.extend(layer.dispose(now));
        }
        push_err(&mut errors, self.master.dispose());
        errors
    }

    fn live_sources(&self) -> usize {
        self.carriers.iter().map(CarrierLayer::live_sources).sum::<usize>()
            + self.isochronic.iter().map(IsochronicLayer::live_sources).sum::<usize>()
    }

    fn snapshot(&self, time: f64) -> VoiceSnapshot {
        let mut snap = VoiceSnapshot::default();
        for layer in &self.carriers {
            snap.oscillators
                .extend(layer.oscillators().iter().map(|o| osc_info(o, time)));
            snap.gain_targets.extend(layer.gain_targets());
        }
        for layer in &self.isochronic {
            let [tone, pulse] = layer.oscillators();
            snap.oscillators.push(osc_info(tone, time));
            snap.lfos.push(LfoInfo {
                frequency: pulse.frequency.value(),
                min: 0.0,
                max: layer.config().volume,
                state: pulse.state_at(time),
            });
            snap.gain_targets.push(layer.levels().0);
        }
        snap
    }
}

/// Strongly typed wrapper for every voice the engines can play.
pub enum VoiceKind {
    CarrierModulation(CarrierModulationVoice),
    Binaural(BinauralVoice),
    Ambient(Box<AmbientVoice>),
    Composite(CompositeVoice),
}

impl VoiceKind {
    /// Ramp every output gain from its current value to `target`.
    pub fn ramp_gain(&mut self, target: f32, now: f64, duration: f64) {
        match self {
            VoiceKind::CarrierModulation(v) => v.gain.gain.ramp_to(target, now, duration),
            VoiceKind::Binaural(v) => {
                v.left.gain.gain.ramp_to(target, now, duration);
                v.right.gain.gain.ramp_to(target, now, duration);
            }
            VoiceKind::Ambient(v) => v.gain.gain.ramp_to(target, now, duration),
            VoiceKind::Composite(v) => v.master.gain.ramp_to(target, now, duration),
        }
    }

    /// Set every output gain immediately.
    pub fn set_gain(&mut self, value: f32) {
        match self {
            VoiceKind::CarrierModulation(v) => v.gain.gain.set_value(value),
            VoiceKind::Binaural(v) => {
                v.left.gain.gain.set_value(value);
                v.right.gain.gain.set_value(value);
            }
            VoiceKind::Ambient(v) => v.gain.gain.set_value(value),
            VoiceKind::Composite(v) => v.master.gain.set_value(value),
        }
    }

    /// Reposition a tone voice. Other voices have no panner.
    pub fn set_pan(&mut self, pan: f32) {
        match self {
            VoiceKind::CarrierModulation(v) => v.panner.pan.set_value(pan),
            VoiceKind::Binaural(v) => {
                let (left, right) = BinauralVoice::ear_pans(pan);
                v.left.panner.pan.set_value(left);
                v.right.panner.pan.set_value(right);
            }
            VoiceKind::Ambient(_) | VoiceKind::Composite(_) => {}
        }
    }

    pub fn start(&mut self, now: f64) -> Vec<NodeError> {
        match self {
            VoiceKind::CarrierModulation(v) => v.start(now),
            VoiceKind::Binaural(v) => v.start(now),
            VoiceKind::Ambient(v) => v.start(now),
            VoiceKind::Composite(v) => v.start(now),
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeVoice> {
        match self {
            VoiceKind::Composite(v) => Some(v),
            _ => None,
        }
    }
}

impl Voice for VoiceKind {
    fn process(&mut self, output: &mut [f32], time: f64, dt: f64) {
        match self {
            VoiceKind::CarrierModulation(v) => v.process(output, time, dt),
            VoiceKind::Binaural(v) => v.process(output, time, dt),
            VoiceKind::Ambient(v) => v.process(output, time, dt),
            VoiceKind::Composite(v) => v.process(output, time, dt),
        }
    }

    fn stop_sources(&mut self, at: f64) -> Vec<NodeError> {
        match self {
            VoiceKind::CarrierModulation(v) => v.stop_sources(at),
            VoiceKind::Binaural(v) => v.stop_sources(at),
            VoiceKind::Ambient(v) => v.stop_sources(at),
            VoiceKind::Composite(v) => v.stop_sources(at),
        }
    }

    fn dispose(&mut self) -> Vec<NodeError> {
        match self {
            VoiceKind::CarrierModulation(v) => v.dispose(),
            VoiceKind::Binaural(v) => v.dispose(),
            VoiceKind::Ambient(v) => v.dispose(),
            VoiceKind::Composite(v) => v.dispose(),
        }
    }

    fn live_sources(&self) -> usize {
        match self {
            VoiceKind::CarrierModulation(v) => v.live_sources(),
            VoiceKind::Binaural(v) => v.live_sources(),
            VoiceKind::Ambient(v) => v.live_sources(),
            VoiceKind::Composite(v) => v.live_sources(),
        }
    }

    fn snapshot(&self, time: f64) -> VoiceSnapshot {
        match self {
            VoiceKind::CarrierModulation(v) => v.snapshot(time),
            VoiceKind::Binaural(v) => v.snapshot(time),
            VoiceKind::Ambient(v) => v.snapshot(time),
            VoiceKind::Composite(v) => v.snapshot(time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 8_000.0;

    fn render(voice: &mut dyn Voice, frames: usize, time: f64) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        voice.process(&mut out, time, DT);
        out
    }

    #[test]
    fn ear_pans_shift_together() {
        assert_eq!(BinauralVoice::ear_pans(0.0), (-1.0, 1.0));
        assert_eq!(BinauralVoice::ear_pans(0.5), (-0.5, 1.0));
        assert_eq!(BinauralVoice::ear_pans(-1.0), (-1.0, 0.0));
    }

    #[test]
    fn centred_binaural_keeps_ears_apart() {
        let mut voice = BinauralVoice::new(195.0, 205.0, 0.0);
        voice.start(0.0);
        voice.left.gain.gain.set_value(1.0);
        voice.right.gain.gain.set_value(1.0);
        let out = render(&mut voice, 800, 0.0);
        // left ear hears only the 195 Hz tone: compare against a solo render
        let mut solo = BinauralVoice::new(195.0, 205.0, 0.0);
        solo.start(0.0);
        solo.left.gain.gain.set_value(1.0);
        let solo_out = render(&mut solo, 800, 0.0);
        for (a, b) in out.chunks(2).zip(solo_out.chunks(2)) {
            assert!((a[0] - b[0]).abs() < 1e-5);
        }
    }

    #[test]
    fn carrier_modulation_sweeps_pitch() {
        let mut voice = CarrierModulationVoice::new(200.0, 4.5, 50.0, 0.0);
        voice.start(0.0);
        voice.gain.gain.set_value(1.0);
        let out = render(&mut voice, 8_000, 0.0);
        let crossings = out
            .chunks(2)
            .map(|f| f[0])
            .collect::<Vec<_>>()
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count();
        // average pitch stays at the 200 Hz carrier
        assert!((195..=210).contains(&crossings), "crossings {crossings}");
        let snap = voice.snapshot(0.5);
        assert_eq!(snap.oscillators.len(), 1);
        assert_eq!(snap.lfos[0].min, -50.0);
        assert_eq!(snap.lfos[0].max, 50.0);
    }

    #[test]
    fn dispose_twice_reports_every_node() {
        let mut voice = VoiceKind::Binaural(BinauralVoice::new(190.0, 210.0, 0.0));
        assert!(voice.dispose().is_empty());
        assert_eq!(voice.live_sources(), 0);
        assert_eq!(voice.dispose().len(), 6);
    }

    #[test]
    fn stopping_an_unstarted_voice_is_absorbed_as_errors() {
        let mut voice = VoiceKind::CarrierModulation(CarrierModulationVoice::new(200.0, 3.0, 50.0, 0.0));
        let errors = voice.stop_sources(0.0);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, NodeError::InvalidState(_))));
    }
}
