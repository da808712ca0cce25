//! Binaural-beat and carrier-modulation tones.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{AudioContext, Destination};
use crate::dsp::{db_to_gain, gain_to_db, SILENCE_DB};
use crate::error::EngineError;
use crate::models::FrequencySpec;
use crate::scheduler::VoiceKey;
use crate::voices::{BinauralVoice, CarrierModulationVoice, VoiceKind, VoiceSnapshot};

/// Targets below this use carrier modulation instead of a binaural pair.
pub const BINAURAL_THRESHOLD_HZ: f32 = 10.0;
pub const REFERENCE_CARRIER_HZ: f32 = 200.0;
/// Pitch sweep of the carrier, in Hz either side of the reference.
pub const MODULATION_DEPTH_HZ: f32 = 50.0;
pub const VOLUME_BOOST: f32 = 2.0;
pub const MIN_EAR_HZ: f32 = 20.0;
pub const MAX_EAR_HZ: f32 = 20_000.0;
pub const FADE_IN: f64 = 0.005;
pub const FADE_OUT: f64 = 0.01;
/// Extra time after the fade-out before the nodes are released.
pub const TEARDOWN_MARGIN: f64 = 0.01;
/// Quietest non-zero master setting, in dB.
pub const MASTER_FLOOR_DB: f32 = -12.0;

pub const DEFAULT_VOLUME: f32 = 0.7;
pub const DEFAULT_PAN: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneStrategy {
    CarrierModulation,
    Binaural,
}

impl ToneStrategy {
    /// The choice is purely numeric; ids and categories play no part.
    pub fn for_frequency(frequency: f32) -> Self {
        if frequency < BINAURAL_THRESHOLD_HZ {
            ToneStrategy::CarrierModulation
        } else {
            ToneStrategy::Binaural
        }
    }
}

/// Left and right ear frequencies for a binaural beat, clamped to the audible band.
pub fn ear_frequencies(beat: f32) -> (f32, f32) {
    let half = beat / 2.0;
    (
        (REFERENCE_CARRIER_HZ - half).clamp(MIN_EAR_HZ, MAX_EAR_HZ),
        (REFERENCE_CARRIER_HZ + half).clamp(MIN_EAR_HZ, MAX_EAR_HZ),
    )
}

/// Gain a voice fades in to for a requested volume.
pub fn boosted_gain(volume: f32) -> f32 {
    (volume * VOLUME_BOOST).min(1.0)
}

/// Master bus level in dB for a linear setting in `[0, 1]`.
pub fn master_db(volume: f32) -> f32 {
    let volume = volume.clamp(0.0, 1.0);
    if volume > 0.0 {
        gain_to_db(volume).max(MASTER_FLOOR_DB)
    } else {
        SILENCE_DB
    }
}

struct VoiceHandle {
    key: VoiceKey,
    strategy: ToneStrategy,
}

pub struct ToneEngine {
    ctx: Arc<AudioContext>,
    voices: HashMap<String, VoiceHandle>,
    master_volume: Option<f32>,
}

impl ToneEngine {
    pub fn new(ctx: Arc<AudioContext>) -> Self {
        Self {
            ctx,
            voices: HashMap::new(),
            master_volume: None,
        }
    }

    pub fn context(&self) -> &Arc<AudioContext> {
        &self.ctx
    }

    pub fn ensure_audio_ready(&self) -> Result<(), EngineError> {
        self.ctx.ensure_running()
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.clock_state() == crate::clock::ClockState::Running
    }

    /// Play at the default volume, centred.
    pub fn play(&mut self, spec: &FrequencySpec) -> Result<String, EngineError> {
        self.play_with(spec, DEFAULT_VOLUME, DEFAULT_PAN)
    }

    pub fn play_with(
        &mut self,
        spec: &FrequencySpec,
        volume: f32,
        pan: f32,
    ) -> Result<String, EngineError> {
        self.ensure_audio_ready()?;
        let volume = volume.clamp(0.0, 1.0);
        let pan = pan.clamp(-1.0, 1.0);
        let target = boosted_gain(volume);
        let strategy = ToneStrategy::for_frequency(spec.frequency);

        let voice = match strategy {
            ToneStrategy::CarrierModulation => VoiceKind::CarrierModulation(
                CarrierModulationVoice::new(
                    REFERENCE_CARRIER_HZ,
                    spec.frequency,
                    MODULATION_DEPTH_HZ,
                    pan,
                ),
            ),
            ToneStrategy::Binaural => {
                let (left, right) = ear_frequencies(spec.frequency);
                VoiceKind::Binaural(BinauralVoice::new(left, right, pan))
            }
        };

        let key = {
            let mut graph = self.ctx.lock();
            let now = graph.now();
            let key = graph.add(voice, Some(Destination::Master));
            if let Some(voice) = graph.voice_mut(key) {
                voice.ramp_gain(target, now, FADE_IN);
                for err in voice.start(now) {
                    tracing::debug!("starting {}: {err}", spec.id);
                }
            }
            key
        };

        let id = self.ctx.voice_id(&spec.id);
        tracing::info!(
            "tone {id}: {:.2} Hz via {strategy:?} at gain {target:.2}",
            spec.frequency
        );
        self.voices.insert(id.clone(), VoiceHandle { key, strategy });
        if let Some(master) = self.master_volume {
            self.set_master_volume(master);
        }
        Ok(id)
    }

    /// Fade out and schedule teardown. Unknown ids are ignored.
    pub fn stop(&mut self, id: &str) {
        let Some(handle) = self.voices.remove(id) else {
            return;
        };
        let mut graph = self.ctx.lock();
        let now = graph.now();
        if let Some(voice) = graph.voice_mut(handle.key) {
            voice.ramp_gain(0.0, now, FADE_OUT);
        }
        graph.schedule_teardown(handle.key, FADE_OUT + TEARDOWN_MARGIN);
        tracing::info!("tone {id} stopping");
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<String> = self.voices.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    /// Set the voice's gain immediately. The boost only applies at play time.
    pub fn set_volume(&mut self, id: &str, volume: f32) {
        let Some(handle) = self.voices.get(id) else {
            return;
        };
        if let Some(voice) = self.ctx.lock().voice_mut(handle.key) {
            voice.set_gain(volume.clamp(0.0, 1.0));
        }
    }

    pub fn set_pan(&mut self, id: &str, pan: f32) {
        let Some(handle) = self.voices.get(id) else {
            return;
        };
        if let Some(voice) = self.ctx.lock().voice_mut(handle.key) {
            voice.set_pan(pan.clamp(-1.0, 1.0));
        }
    }

    /// Write the shared master gain. The last writer wins.
    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.master_volume = Some(volume);
        let db = master_db(volume);
        self.ctx.lock().master().set_value(db_to_gain(db));
        tracing::debug!("master volume {volume:.2} -> {db:.1} dB");
    }

    pub fn master_volume(&self) -> Option<f32> {
        self.master_volume
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voice_ids(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }

    pub fn strategy(&self, id: &str) -> Option<ToneStrategy> {
        self.voices.get(id).map(|h| h.strategy)
    }

    pub fn snapshot(&self, id: &str) -> Option<VoiceSnapshot> {
        let handle = self.voices.get(id)?;
        self.ctx.lock().snapshot(handle.key)
    }
}

impl Drop for ToneEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_hertz_is_binaural() {
        assert_eq!(ToneStrategy::for_frequency(9.99), ToneStrategy::CarrierModulation);
        assert_eq!(ToneStrategy::for_frequency(10.0), ToneStrategy::Binaural);
        assert_eq!(ToneStrategy::for_frequency(0.5), ToneStrategy::CarrierModulation);
    }

    #[test]
    fn ears_are_clamped_to_the_audible_band() {
        assert_eq!(ear_frequencies(10.0), (195.0, 205.0));
        assert_eq!(ear_frequencies(400.0), (20.0, 400.0));
        assert_eq!(ear_frequencies(390.0), (20.0, 395.0));
        let (l, r) = ear_frequencies(40.5);
        assert!((r - l - 40.5).abs() < 1e-4);
    }

    #[test]
    fn boost_is_capped() {
        assert_eq!(boosted_gain(0.7), 1.0);
        assert_eq!(boosted_gain(0.25), 0.5);
        assert_eq!(boosted_gain(0.0), 0.0);
    }

    #[test]
    fn master_curve_is_floored_and_monotonic() {
        assert_eq!(master_db(0.0), SILENCE_DB);
        assert_eq!(master_db(1.0), 0.0);
        assert_eq!(master_db(0.01), MASTER_FLOOR_DB);
        let mut last = master_db(0.0);
        for i in 1..=100 {
            let db = master_db(i as f32 / 100.0);
            assert!(db >= last);
            last = db;
        }
    }
}
