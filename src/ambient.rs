//! Procedural ambient beds: coloured noise, optionally filtered and swept,
//! through a gain and a small room reverb.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{AudioContext, Destination};
use crate::dsp::{NoiseColor, NoiseGenerator};
use crate::error::EngineError;
use crate::graph::{FilterKind, NoiseSource, ReverbNode};
use crate::models::AmbientSoundSpec;
use crate::scheduler::VoiceKey;
use crate::voices::{AmbientVoice, VoiceKind, VoiceSnapshot};

pub const FADE_IN: f64 = 0.5;
pub const FADE_OUT: f64 = 0.3;
pub const TEARDOWN_DELAY: f64 = 0.35;
pub const VOLUME_RAMP: f64 = 0.1;
pub const REVERB_DECAY: f32 = 2.0;
pub const REVERB_WET: f32 = 0.3;
pub const DEFAULT_VOLUME: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
}

/// Sweep applied to the filter centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoSpec {
    pub frequency: f32,
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedRecipe {
    pub noise: NoiseColor,
    pub filter: Option<FilterSpec>,
    pub lfo: Option<LfoSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientCategory {
    Nature,
    Noise,
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbientSound {
    Rain,
    OceanWaves,
    ForestBirds,
    Wind,
    WhiteNoise,
    PinkNoise,
    BrownNoise,
    Fireplace,
}

fn lowpass(frequency: f32, q: f32) -> Option<FilterSpec> {
    Some(FilterSpec {
        kind: FilterKind::LowPass,
        frequency,
        q,
    })
}

fn bandpass(frequency: f32, q: f32) -> Option<FilterSpec> {
    Some(FilterSpec {
        kind: FilterKind::BandPass,
        frequency,
        q,
    })
}

fn sweep(frequency: f32, min: f32, max: f32) -> Option<LfoSpec> {
    Some(LfoSpec { frequency, min, max })
}

/// Bed used for ids the catalog does not know.
pub const FALLBACK_RECIPE: BedRecipe = BedRecipe {
    noise: NoiseColor::Pink,
    filter: None,
    lfo: None,
};

impl AmbientSound {
    pub const ALL: [AmbientSound; 8] = [
        AmbientSound::Rain,
        AmbientSound::OceanWaves,
        AmbientSound::ForestBirds,
        AmbientSound::Wind,
        AmbientSound::WhiteNoise,
        AmbientSound::PinkNoise,
        AmbientSound::BrownNoise,
        AmbientSound::Fireplace,
    ];

    pub fn id(self) -> &'static str {
        match self {
            AmbientSound::Rain => "rain",
            AmbientSound::OceanWaves => "ocean-waves",
            AmbientSound::ForestBirds => "forest-birds",
            AmbientSound::Wind => "wind",
            AmbientSound::WhiteNoise => "white-noise",
            AmbientSound::PinkNoise => "pink-noise",
            AmbientSound::BrownNoise => "brown-noise",
            AmbientSound::Fireplace => "fireplace",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AmbientSound::Rain => "Rain",
            AmbientSound::OceanWaves => "Ocean Waves",
            AmbientSound::ForestBirds => "Forest Birds",
            AmbientSound::Wind => "Wind",
            AmbientSound::WhiteNoise => "White Noise",
            AmbientSound::PinkNoise => "Pink Noise",
            AmbientSound::BrownNoise => "Brown Noise",
            AmbientSound::Fireplace => "Fireplace",
        }
    }

    pub fn category(self) -> AmbientCategory {
        match self {
            AmbientSound::Rain
            | AmbientSound::OceanWaves
            | AmbientSound::ForestBirds
            | AmbientSound::Wind => AmbientCategory::Nature,
            AmbientSound::WhiteNoise | AmbientSound::PinkNoise | AmbientSound::BrownNoise => {
                AmbientCategory::Noise
            }
            AmbientSound::Fireplace => AmbientCategory::Fire,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Recipe for `id`, falling back to plain pink noise.
    pub fn resolve(id: &str) -> BedRecipe {
        Self::from_id(id).map_or(FALLBACK_RECIPE, Self::recipe)
    }

    pub fn recipe(self) -> BedRecipe {
        let (noise, filter, lfo) = match self {
            AmbientSound::Rain => (NoiseColor::Pink, lowpass(1000.0, 1.0), None),
            AmbientSound::OceanWaves => (
                NoiseColor::Brown,
                lowpass(800.0, 2.0),
                sweep(0.1, 400.0, 1200.0),
            ),
            AmbientSound::ForestBirds => (NoiseColor::Pink, bandpass(2000.0, 3.0), None),
            AmbientSound::Wind => (
                NoiseColor::Pink,
                lowpass(300.0, 0.5),
                sweep(0.05, 200.0, 400.0),
            ),
            AmbientSound::WhiteNoise => (NoiseColor::White, None, None),
            AmbientSound::PinkNoise => (NoiseColor::Pink, None, None),
            AmbientSound::BrownNoise => (NoiseColor::Brown, lowpass(500.0, 1.0), None),
            AmbientSound::Fireplace => (
                NoiseColor::Pink,
                bandpass(2000.0, 4.0),
                sweep(2.0, 1500.0, 2500.0),
            ),
        };
        BedRecipe { noise, filter, lfo }
    }
}

impl fmt::Display for AmbientSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

pub struct AmbientBedEngine {
    ctx: Arc<AudioContext>,
    voices: HashMap<String, VoiceKey>,
    seed: Option<u64>,
}

impl AmbientBedEngine {
    pub fn new(ctx: Arc<AudioContext>) -> Self {
        Self {
            ctx,
            voices: HashMap::new(),
            seed: None,
        }
    }

    /// Deterministic noise, one stream per voice derived from `seed`.
    pub fn with_seed(ctx: Arc<AudioContext>, seed: u64) -> Self {
        Self {
            ctx,
            voices: HashMap::new(),
            seed: Some(seed),
        }
    }

    pub fn play(&mut self, sound: &AmbientSoundSpec) -> Result<String, EngineError> {
        self.play_with(sound, DEFAULT_VOLUME)
    }

    pub fn play_with(&mut self, sound: &AmbientSoundSpec, volume: f32) -> Result<String, EngineError> {
        self.ctx.ensure_running()?;
        let volume = volume.clamp(0.0, 1.0);
        let recipe = AmbientSound::resolve(&sound.id);
        if AmbientSound::from_id(&sound.id).is_none() {
            tracing::debug!("unknown ambient sound {}, using pink noise", sound.id);
        }

        let noise = match self.seed.as_mut() {
            Some(seed) => {
                *seed = seed.wrapping_add(1);
                NoiseSource::from_generator(NoiseGenerator::seeded(recipe.noise, *seed))
            }
            None => NoiseSource::new(recipe.noise),
        };

        let key = {
            let mut graph = self.ctx.lock();
            let sr = graph.sample_rate();
            let now = graph.now();
            let reverb = ReverbNode::new(sr, REVERB_DECAY, REVERB_WET);
            let voice = VoiceKind::Ambient(Box::new(AmbientVoice::new(recipe, noise, reverb, sr)));
            let key = graph.add(voice, Some(Destination::Master));
            if let Some(voice) = graph.voice_mut(key) {
                voice.ramp_gain(volume, now, FADE_IN);
                for err in voice.start(now) {
                    tracing::debug!("starting {}: {err}", sound.id);
                }
            }
            key
        };

        let id = self.ctx.voice_id(&sound.id);
        tracing::info!("ambient {id}: {:?} bed at {volume:.2}", recipe.noise);
        self.voices.insert(id.clone(), key);
        Ok(id)
    }

    pub fn stop(&mut self, id: &str) {
        let Some(key) = self.voices.remove(id) else {
            return;
        };
        let mut graph = self.ctx.lock();
        let now = graph.now();
        if let Some(voice) = graph.voice_mut(key) {
            voice.ramp_gain(0.0, now, FADE_OUT);
        }
        graph.schedule_teardown(key, TEARDOWN_DELAY);
        tracing::info!("ambient {id} stopping");
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<String> = self.voices.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    pub fn set_volume(&mut self, id: &str, volume: f32) {
        let Some(&key) = self.voices.get(id) else {
            return;
        };
        let mut graph = self.ctx.lock();
        let now = graph.now();
        if let Some(voice) = graph.voice_mut(key) {
            voice.ramp_gain(volume.clamp(0.0, 1.0), now, VOLUME_RAMP);
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn snapshot(&self, id: &str) -> Option<VoiceSnapshot> {
        let key = *self.voices.get(id)?;
        self.ctx.lock().snapshot(key)
    }
}

impl Drop for AmbientBedEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_the_catalog() {
        for sound in AmbientSound::ALL {
            assert_eq!(AmbientSound::from_id(sound.id()), Some(sound));
            let json = serde_json::to_string(&sound).unwrap();
            assert_eq!(json, format!("\"{}\"", sound.id()));
        }
    }

    #[test]
    fn unknown_ids_fall_back_to_pink_noise() {
        assert_eq!(AmbientSound::resolve("unknown-category"), FALLBACK_RECIPE);
        assert_eq!(AmbientSound::resolve("pink-noise"), FALLBACK_RECIPE);
    }

    #[test]
    fn recipes_match_the_catalog() {
        let ocean = AmbientSound::OceanWaves.recipe();
        assert_eq!(ocean.noise, NoiseColor::Brown);
        assert_eq!(ocean.filter, lowpass(800.0, 2.0));
        assert_eq!(ocean.lfo, sweep(0.1, 400.0, 1200.0));
        let fire = AmbientSound::Fireplace.recipe();
        assert_eq!(fire.filter.map(|f| f.kind), Some(FilterKind::BandPass));
        assert_eq!(AmbientSound::WhiteNoise.recipe().filter, None);
        assert_eq!(AmbientSound::BrownNoise.recipe().filter, lowpass(500.0, 1.0));
    }

    #[test]
    fn categories() {
        assert_eq!(AmbientSound::Wind.category(), AmbientCategory::Nature);
        assert_eq!(AmbientSound::BrownNoise.category(), AmbientCategory::Noise);
        assert_eq!(AmbientSound::Fireplace.category(), AmbientCategory::Fire);
        assert_eq!(AmbientSound::OceanWaves.to_string(), "ocean-waves");
    }
}
