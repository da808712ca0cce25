use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Sample rate used for offline rendering. Streaming uses the device rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Frames rendered per block when generating files.
    #[serde(default = "default_block_frames")]
    pub block_frames: usize,
    #[serde(default = "default_master_volume")]
    pub default_master_volume: f32,
    #[serde(default = "default_gain")]
    pub tone_gain: f32,
    #[serde(default = "default_gain")]
    pub ambient_gain: f32,
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_block_frames() -> usize {
    512
}

fn default_master_volume() -> f32 {
    0.8
}

fn default_gain() -> f32 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            output_dir: default_output_dir(),
            block_frames: default_block_frames(),
            default_master_volume: default_master_volume(),
            tone_gain: 1.0,
            ambient_gain: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self, EngineError> {
        toml::from_str(txt).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load the config at `path`, or the defaults if the file is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(txt) => Self::from_toml_str(&txt).unwrap_or_else(|err| {
                tracing::warn!("ignoring {}: {err}", path.as_ref().display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write the default configuration as TOML.
    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<(), EngineError> {
        let txt = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), txt).map_err(|e| EngineError::Config(e.to_string()))
    }
}

pub static CONFIG: Lazy<EngineConfig> = Lazy::new(|| {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.toml");
    EngineConfig::load_or_default(path)
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = EngineConfig::from_toml_str("sample_rate = 48000\nambient_gain = 0.5\n").unwrap();
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.ambient_gain, 0.5);
        assert_eq!(cfg.tone_gain, 1.0);
        assert_eq!(cfg.block_frames, 512);
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = EngineConfig::from_toml_str("sample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn generated_default_round_trips() {
        let path = std::env::temp_dir().join(format!(
            "binaural_engine_cfg_{}.toml",
            std::process::id()
        ));
        EngineConfig::generate_default(&path).unwrap();
        let loaded = EngineConfig::load_or_default(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, EngineConfig::default());
    }
}
