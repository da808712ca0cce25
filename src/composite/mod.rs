//! Multi-layer presets: several binaural carrier pairs plus pulsed tones,
//! all started on the same clock instant behind one preset gain.

pub mod carrier;
pub mod isochronic;
pub mod presets;

use std::sync::Arc;

use crate::context::{AudioContext, Destination};
use crate::error::EngineError;
use crate::scheduler::VoiceKey;
use crate::voices::{CompositeVoice, VoiceKind, VoiceSnapshot};

pub use carrier::{CarrierLayer, LayerState};
pub use isochronic::IsochronicLayer;
pub use presets::{preset_by_id, CarrierLayerConfig, CompositeSignalConfig, IsochronicLayerConfig, PRESETS};

pub struct CompositeSignalGenerator {
    ctx: Arc<AudioContext>,
    slot: Option<VoiceKey>,
    config: Option<CompositeSignalConfig>,
    destination: Option<Destination>,
    volume: f32,
    playing: bool,
}

impl CompositeSignalGenerator {
    pub fn new(ctx: Arc<AudioContext>) -> Self {
        Self {
            ctx,
            slot: None,
            config: None,
            destination: None,
            volume: 1.0,
            playing: false,
        }
    }

    /// Build the layers for `config`, replacing whatever was loaded before.
    pub fn initialize(&mut self, config: &CompositeSignalConfig) {
        if self.slot.is_some() {
            self.dispose();
        }
        let voice = CompositeVoice::new(config, self.volume);
        let key = self
            .ctx
            .lock()
            .add(VoiceKind::Composite(voice), self.destination);
        tracing::info!(
            "preset {} loaded: {} carrier and {} isochronic layers",
            config.id,
            config.carrier_layers.len(),
            config.isochronic_layers.len()
        );
        self.slot = Some(key);
        self.config = Some(config.clone());
    }

    pub fn connect(&mut self, destination: Destination) {
        self.destination = Some(destination);
        if let Some(key) = self.slot {
            self.ctx.lock().connect(key, destination);
        }
    }

    /// Start every layer at one instant. All layers are playing on return.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let key = self
            .slot
            .ok_or(EngineError::NotInitialized("CompositeSignalGenerator"))?;
        if self.playing {
            return Ok(());
        }
        let mut graph = self.ctx.lock();
        let now = graph.now();
        if let Some(voice) = graph.voice_mut(key).and_then(VoiceKind::as_composite_mut) {
            for err in voice.start(now) {
                tracing::debug!("starting preset layer: {err}");
            }
        }
        self.playing = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(key) = self.slot {
            let mut graph = self.ctx.lock();
            let now = graph.now();
            if let Some(voice) = graph.voice_mut(key).and_then(VoiceKind::as_composite_mut) {
                for err in voice.stop(now) {
                    tracing::debug!("stopping preset layer: {err}");
                }
            }
        }
        self.playing = false;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        if let Some(key) = self.slot {
            let mut graph = self.ctx.lock();
            let now = graph.now();
            if let Some(voice) = graph.voice_mut(key).and_then(VoiceKind::as_composite_mut) {
                let gain = voice.master_gain();
                gain.cancel_scheduled(now);
                gain.set_value_at(volume, now);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.is_some()
    }

    pub fn config(&self) -> Option<&CompositeSignalConfig> {
        self.config.as_ref()
    }

    pub fn snapshot(&self) -> Option<VoiceSnapshot> {
        self.ctx.lock().snapshot(self.slot?)
    }

    /// Stop, release every layer and disconnect. `initialize` must be called again.
    pub fn dispose(&mut self) {
        self.stop();
        if let Some(key) = self.slot.take() {
            self.ctx.lock().teardown(key);
        }
        if let Some(config) = self.config.take() {
            tracing::info!("preset {} disposed", config.id);
        }
        self.destination = None;
        self.playing = false;
    }
}

impl Drop for CompositeSignalGenerator {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::OfflineClock;

    fn generator() -> CompositeSignalGenerator {
        CompositeSignalGenerator::new(AudioContext::new(OfflineClock::running(8_000)))
    }

    #[test]
    fn start_before_initialize_fails() {
        let mut gen = generator();
        assert_eq!(
            gen.start(),
            Err(EngineError::NotInitialized("CompositeSignalGenerator"))
        );
        gen.stop();
        assert!(!gen.is_playing());
    }

    #[test]
    fn volume_is_clamped() {
        let mut gen = generator();
        gen.set_volume(1.7);
        assert_eq!(gen.volume(), 1.0);
        gen.initialize(preset_by_id("gateway-schumann").unwrap());
        gen.set_volume(-0.2);
        assert_eq!(gen.volume(), 0.0);
    }

    #[test]
    fn dispose_resets_everything() {
        let mut gen = generator();
        gen.initialize(preset_by_id("gateway-focus-12").unwrap());
        gen.connect(Destination::Master);
        gen.start().unwrap();
        gen.dispose();
        assert!(!gen.is_initialized());
        assert!(!gen.is_playing());
        assert!(gen.config().is_none());
        assert!(gen.snapshot().is_none());
        assert_eq!(gen.ctx.lock().slot_count(), 0);
    }
}
