//! Plays a saved session: a tone mix, ambient beds, an optional preset, an
//! optional frequency sequence and an optional sleep timer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ambient::{self, AmbientBedEngine};
use crate::composite::{preset_by_id, CompositeSignalConfig, CompositeSignalGenerator};
use crate::config::EngineConfig;
use crate::context::{AudioContext, Destination};
use crate::error::EngineError;
use crate::models::{AmbientSoundSpec, FrequencySpec};
use crate::tone::{self, ToneEngine};

fn default_tone_volume() -> f32 {
    tone::DEFAULT_VOLUME
}

fn default_ambient_volume() -> f32 {
    ambient::DEFAULT_VOLUME
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MixEntry {
    pub frequency: FrequencySpec,
    #[serde(default = "default_tone_volume")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AmbientEntry {
    pub id: String,
    #[serde(default = "default_ambient_volume")]
    pub volume: f32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SequenceStep {
    pub frequency: FrequencySpec,
    #[serde(alias = "duration", alias = "durationMinutes")]
    pub duration_minutes: f64,
    #[serde(default)]
    pub volume: Option<f32>,
    #[serde(default)]
    pub pan: Option<f32>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SequenceData {
    pub steps: Vec<SequenceStep>,
    /// The next step enters this long before the previous one ends.
    #[serde(default, alias = "fadeDuration", alias = "fadeSeconds")]
    pub fade_seconds: f64,
}

impl SequenceData {
    /// `(enter, leave)` in seconds for every step.
    fn windows(&self) -> Vec<(f64, f64)> {
        let mut start = 0.0;
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let duration = (step.duration_minutes * 60.0).max(0.0);
                let lead = if i == 0 { 0.0 } else { self.fade_seconds.clamp(0.0, duration) };
                let window = (start - lead, start + duration);
                start += duration;
                window
            })
            .collect()
    }

    pub fn total_seconds(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| (s.duration_minutes * 60.0).max(0.0))
            .sum()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionData {
    /// Falls back to the configured default when absent.
    #[serde(default, alias = "masterVolume")]
    pub master_volume: Option<f32>,
    #[serde(default, alias = "frequencies")]
    pub tones: Vec<MixEntry>,
    #[serde(default)]
    pub ambient: Vec<AmbientEntry>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub sequence: Option<SequenceData>,
    #[serde(default, alias = "timerMinutes")]
    pub timer_minutes: Option<f64>,
}

impl SessionData {
    pub fn from_json(txt: &str) -> Result<Self, EngineError> {
        serde_json::from_str(txt).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let txt = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json(&txt)
    }

    /// Seconds until the session ends on its own, if it does.
    pub fn duration_seconds(&self) -> Option<f64> {
        let timer = self.timer_minutes.map(|m| m * 60.0);
        let sequence = self.sequence.as_ref().map(SequenceData::total_seconds);
        match (timer, sequence) {
            (Some(t), Some(s)) => Some(t.min(s)),
            (t, s) => t.or(s),
        }
    }
}

pub struct SessionPlayer {
    tones: ToneEngine,
    ambient: AmbientBedEngine,
    composite: CompositeSignalGenerator,
    data: SessionData,
    default_master_volume: f32,
    tone_gain: f32,
    ambient_gain: f32,
    elapsed: f64,
    steps: BTreeMap<usize, String>,
    running: bool,
}

impl SessionPlayer {
    pub fn new(ctx: Arc<AudioContext>, data: SessionData, config: &EngineConfig) -> Self {
        Self {
            tones: ToneEngine::new(ctx.clone()),
            ambient: AmbientBedEngine::new(ctx.clone()),
            composite: CompositeSignalGenerator::new(ctx),
            data,
            default_master_volume: config.default_master_volume,
            tone_gain: config.tone_gain,
            ambient_gain: config.ambient_gain,
            elapsed: 0.0,
            steps: BTreeMap::new(),
            running: false,
        }
    }

    pub fn tones(&self) -> &ToneEngine {
        &self.tones
    }

    pub fn ambient(&self) -> &AmbientBedEngine {
        &self.ambient
    }

    pub fn composite(&self) -> &CompositeSignalGenerator {
        &self.composite
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Play the mix, beds and preset. Nothing is left sounding on failure.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let preset = match self.data.preset.as_deref() {
            Some(id) => Some(
                preset_by_id(id).ok_or_else(|| EngineError::Config(format!("unknown preset {id}")))?,
            ),
            None => None,
        };
        self.tones.ensure_audio_ready()?;
        self.tones.set_master_volume(
            self.data
                .master_volume
                .unwrap_or(self.default_master_volume),
        );

        self.running = true;
        if let Err(err) = self.play_all(preset) {
            tracing::warn!("session failed to start: {err}");
            self.stop();
            return Err(err);
        }
        tracing::info!(
            "session started: {} tones, {} beds, preset {:?}",
            self.tones.active_voice_count(),
            self.ambient.active_voice_count(),
            self.data.preset
        );
        Ok(())
    }

    fn play_all(&mut self, preset: Option<&CompositeSignalConfig>) -> Result<(), EngineError> {
        for entry in self.data.tones.iter().filter(|e| e.enabled) {
            self.tones
                .play_with(&entry.frequency, entry.volume * self.tone_gain, entry.pan)?;
        }
        for entry in &self.data.ambient {
            self.ambient
                .play_with(&AmbientSoundSpec::new(entry.id.clone()), entry.volume * self.ambient_gain)?;
        }
        if let Some(preset) = preset {
            self.composite.initialize(preset);
            self.composite.connect(Destination::Master);
            self.composite.start()?;
        }
        self.sync_sequence()
    }

    /// Move the session clock forward and update the sequence.
    pub fn advance(&mut self, seconds: f64) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        self.elapsed += seconds.max(0.0);
        self.sync_sequence()?;
        if self.finished() {
            tracing::info!("session finished after {:.1}s", self.elapsed);
            self.stop();
        }
        Ok(())
    }

    fn sync_sequence(&mut self) -> Result<(), EngineError> {
        let Some(sequence) = self.data.sequence.as_ref() else {
            return Ok(());
        };
        let windows = sequence.windows();
        let t = self.elapsed;
        let wanted: Vec<usize> = windows
            .iter()
            .enumerate()
            .filter(|(_, (enter, leave))| t >= *enter && t < *leave)
            .map(|(i, _)| i)
            .collect();

        let finished: Vec<usize> = self
            .steps
            .keys()
            .copied()
            .filter(|i| !wanted.contains(i))
            .collect();
        for i in finished {
            if let Some(id) = self.steps.remove(&i) {
                self.tones.stop(&id);
            }
        }

        for i in wanted {
            if self.steps.contains_key(&i) {
                continue;
            }
            let step = &sequence.steps[i];
            let volume = step.volume.unwrap_or(tone::DEFAULT_VOLUME) * self.tone_gain;
            let id = self
                .tones
                .play_with(&step.frequency, volume, step.pan.unwrap_or(tone::DEFAULT_PAN))?;
            tracing::info!("sequence step {} of {}", i + 1, sequence.steps.len());
            self.steps.insert(i, id);
        }
        Ok(())
    }

    pub fn finished(&self) -> bool {
        self.data
            .duration_seconds()
            .map_or(false, |d| self.elapsed >= d)
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.tones.stop_all();
        self.ambient.stop_all();
        self.composite.stop();
        self.steps.clear();
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(json: &str) -> SessionData {
        SessionData::from_json(json).unwrap()
    }

    #[test]
    fn defaults_fill_in_missing_fields() {
        let data = session(
            r#"{"tones":[{"frequency":{"id":"alpha-10","frequency":10,"category":"alpha"}}],
                "ambient":[{"id":"rain"}]}"#,
        );
        assert_eq!(data.master_volume, None);
        assert_eq!(data.tones[0].volume, 0.7);
        assert!(data.tones[0].enabled);
        assert_eq!(data.ambient[0].volume, 0.3);
        assert_eq!(data.duration_seconds(), None);
    }

    #[test]
    fn sequence_windows_overlap_by_the_fade() {
        let data = session(
            r#"{"sequence":{"fadeDuration":5,"steps":[
                {"frequency":{"id":"a","frequency":10,"category":"alpha"},"duration":1},
                {"frequency":{"id":"b","frequency":6,"category":"theta"},"duration":2}]},
                "timerMinutes":30}"#,
        );
        let seq = data.sequence.as_ref().unwrap();
        assert_eq!(seq.windows(), vec![(0.0, 60.0), (55.0, 180.0)]);
        assert_eq!(seq.total_seconds(), 180.0);
        assert_eq!(data.duration_seconds(), Some(180.0));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            SessionData::from_json("{\"tones\": 3}"),
            Err(EngineError::Config(_))
        ));
    }
}
