//! Built-in multi-layer presets.

use std::f32::consts::PI;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarrierLayerConfig {
    pub left_freq: f32,
    pub right_freq: f32,
    pub volume: f32,
    /// Radians. Kept with the catalog entry; oscillators still start at phase zero.
    #[serde(default)]
    pub phase: f32,
}

impl CarrierLayerConfig {
    pub fn beat_freq(&self) -> f32 {
        self.right_freq - self.left_freq
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IsochronicLayerConfig {
    pub frequency: f32,
    pub pulse_rate: f32,
    pub duty_cycle: f32,
    pub volume: f32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSignalConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target_beat_freq: f32,
    pub carrier_layers: Vec<CarrierLayerConfig>,
    #[serde(default)]
    pub isochronic_layers: Vec<IsochronicLayerConfig>,
}

fn carrier(left_freq: f32, right_freq: f32, volume: f32, phase: f32) -> CarrierLayerConfig {
    CarrierLayerConfig {
        left_freq,
        right_freq,
        volume,
        phase,
    }
}

fn iso(frequency: f32, pulse_rate: f32, duty_cycle: f32, volume: f32) -> IsochronicLayerConfig {
    IsochronicLayerConfig {
        frequency,
        pulse_rate,
        duty_cycle,
        volume,
    }
}

/// Carrier ladder sharing one beat: `(left, volume, phase / PI)`.
fn ladder(beat: f32, rungs: &[(f32, f32, f32)]) -> Vec<CarrierLayerConfig> {
    rungs
        .iter()
        .map(|&(left, volume, phase)| carrier(left, left + beat, volume, phase * PI))
        .collect()
}

fn preset(
    id: &str,
    name: &str,
    description: &str,
    target: f32,
    carrier_layers: Vec<CarrierLayerConfig>,
    isochronic_layers: Vec<IsochronicLayerConfig>,
) -> CompositeSignalConfig {
    CompositeSignalConfig {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        target_beat_freq: target,
        carrier_layers,
        isochronic_layers,
    }
}

pub static PRESETS: Lazy<Vec<CompositeSignalConfig>> = Lazy::new(|| {
    vec![
        preset(
            "gateway-focus-10",
            "Gateway Focus 10",
            "Mind awake, body asleep",
            5.0,
            ladder(
                5.0,
                &[
                    (100.0, 0.85, 0.0),
                    (200.0, 0.70, 0.25),
                    (300.0, 0.55, 0.5),
                    (150.0, 0.60, 1.0 / 6.0),
                    (250.0, 0.50, 1.0 / 3.0),
                    (400.0, 0.40, 0.75),
                ],
            ),
            vec![iso(5.0, 5.0, 0.5, 0.25), iso(10.0, 5.0, 0.4, 0.15)],
        ),
        preset(
            "gateway-focus-12",
            "Gateway Focus 12",
            "Expanded awareness",
            4.0,
            ladder(
                4.0,
                &[
                    (100.0, 0.90, 0.0),
                    (200.0, 0.75, 1.0 / 6.0),
                    (150.0, 0.65, 1.0 / 3.0),
                    (300.0, 0.60, 0.5),
                    (250.0, 0.55, 2.0 / 3.0),
                    (400.0, 0.45, 5.0 / 6.0),
                    (500.0, 0.35, 1.0),
                ],
            ),
            vec![
                iso(4.0, 4.0, 0.5, 0.30),
                iso(8.0, 4.0, 0.4, 0.20),
                iso(12.0, 4.0, 0.35, 0.15),
            ],
        ),
        preset(
            "gateway-focus-15",
            "Gateway Focus 15",
            "No time",
            5.0,
            ladder(
                5.0,
                &[
                    (100.0, 0.88, 0.0),
                    (150.0, 0.72, 0.2),
                    (200.0, 0.68, 0.4),
                    (300.0, 0.58, 0.6),
                    (250.0, 0.62, 0.8),
                    (350.0, 0.52, 1.0),
                    (450.0, 0.42, 1.2),
                    (500.0, 0.38, 1.4),
                ],
            ),
            vec![
                iso(5.0, 5.0, 0.5, 0.28),
                iso(10.0, 5.0, 0.45, 0.18),
                iso(15.0, 5.0, 0.40, 0.12),
            ],
        ),
        preset(
            "gateway-focus-21",
            "Gateway Focus 21",
            "Edge of perception",
            4.5,
            ladder(
                4.5,
                &[
                    (100.0, 0.92, 0.0),
                    (150.0, 0.78, 0.125),
                    (200.0, 0.74, 0.25),
                    (250.0, 0.70, 0.375),
                    (300.0, 0.66, 0.5),
                    (350.0, 0.62, 0.625),
                    (400.0, 0.58, 0.75),
                    (450.0, 0.54, 0.875),
                    (500.0, 0.50, 1.0),
                    (550.0, 0.46, 1.125),
                    (600.0, 0.42, 1.25),
                    (650.0, 0.38, 1.375),
                ],
            ),
            vec![
                iso(4.5, 4.5, 0.5, 0.32),
                iso(9.0, 4.5, 0.45, 0.22),
                iso(13.5, 4.5, 0.40, 0.16),
                iso(18.0, 4.5, 0.35, 0.12),
                iso(22.5, 4.5, 0.30, 0.10),
            ],
        ),
        preset(
            "gateway-focus-27",
            "Gateway Focus 27",
            "Recycling station",
            3.5,
            ladder(
                3.5,
                &[
                    (100.0, 0.95, 0.0),
                    (150.0, 0.82, 0.1),
                    (200.0, 0.78, 0.2),
                    (250.0, 0.74, 0.3),
                    (300.0, 0.70, 0.4),
                    (350.0, 0.66, 0.5),
                    (400.0, 0.62, 0.6),
                    (450.0, 0.58, 0.7),
                    (500.0, 0.54, 0.8),
                    (550.0, 0.50, 0.9),
                    (600.0, 0.46, 1.0),
                    (650.0, 0.42, 1.1),
                    (700.0, 0.38, 1.2),
                    (750.0, 0.34, 1.3),
                    (800.0, 0.30, 1.4),
                ],
            ),
            vec![
                iso(3.5, 3.5, 0.5, 0.35),
                iso(7.0, 3.5, 0.45, 0.25),
                iso(10.5, 3.5, 0.40, 0.18),
                iso(14.0, 3.5, 0.35, 0.14),
                iso(17.5, 3.5, 0.30, 0.12),
                iso(21.0, 3.5, 0.25, 0.10),
            ],
        ),
        preset(
            "gateway-schumann",
            "Schumann Resonance",
            "Earth's natural frequency",
            7.83,
            ladder(
                7.83,
                &[
                    (100.0, 0.80, 0.0),
                    (200.0, 0.65, 0.25),
                    (300.0, 0.50, 0.5),
                    (150.0, 0.60, 1.0 / 6.0),
                ],
            ),
            vec![iso(7.83, 7.83, 0.5, 0.30)],
        ),
    ]
});

/// Frequency-library ids that open a preset.
const ALIASES: [(&str, &str); 6] = [
    ("gateway-6.3", "gateway-focus-10"),
    ("gateway-40.5", "gateway-focus-12"),
    ("gateway-15.5", "gateway-focus-15"),
    ("gateway-21", "gateway-focus-21"),
    ("gateway-27", "gateway-focus-27"),
    ("gateway-7.83", "gateway-schumann"),
];

pub fn preset_by_id(id: &str) -> Option<&'static CompositeSignalConfig> {
    let id = ALIASES
        .iter()
        .find(|(alias, _)| *alias == id)
        .map_or(id, |(_, target)| *target);
    PRESETS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_resolves() {
        for (alias, target) in ALIASES {
            assert_eq!(preset_by_id(alias).map(|p| p.id.as_str()), Some(target));
        }
        assert!(preset_by_id("gateway-99").is_none());
    }

    #[test]
    fn carrier_beats_match_the_target() {
        for p in PRESETS.iter() {
            assert!(!p.carrier_layers.is_empty());
            for layer in &p.carrier_layers {
                assert!(
                    (layer.beat_freq() - p.target_beat_freq).abs() < 1e-3,
                    "{} layer {:?}",
                    p.id,
                    layer
                );
            }
        }
    }

    #[test]
    fn focus_10_layout() {
        let p = preset_by_id("gateway-focus-10").unwrap();
        assert_eq!(p.carrier_layers.len(), 6);
        assert_eq!(p.isochronic_layers.len(), 2);
        assert_eq!(p.carrier_layers[5].left_freq, 400.0);
        assert!((p.carrier_layers[5].phase - 3.0 * PI / 4.0).abs() < 1e-6);
        assert_eq!(p.isochronic_layers[1], iso(10.0, 5.0, 0.4, 0.15));
    }

    #[test]
    fn config_parses_from_camel_case_json() {
        let cfg: CompositeSignalConfig = serde_json::from_str(
            r#"{"id":"custom","name":"Custom","targetBeatFreq":6.0,
                "carrierLayers":[{"leftFreq":120,"rightFreq":126,"volume":0.5}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.carrier_layers[0].beat_freq(), 6.0);
        assert!(cfg.isochronic_layers.is_empty());
    }
}
