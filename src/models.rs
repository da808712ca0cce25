use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyCategory {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
    Experimental,
}

/// Descriptive fields carried with a frequency. The engines never read them.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FrequencyMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "recommendedDuration")]
    pub recommended_duration_minutes: Option<f32>,
}

/// A target beat frequency as supplied by the caller.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FrequencySpec {
    pub id: String,
    /// Hz.
    #[serde(alias = "numericFrequency")]
    pub frequency: f32,
    pub category: FrequencyCategory,
    #[serde(default)]
    pub metadata: Option<FrequencyMetadata>,
}

impl FrequencySpec {
    pub fn new(id: impl Into<String>, frequency: f32, category: FrequencyCategory) -> Self {
        Self {
            id: id.into(),
            frequency,
            category,
            metadata: None,
        }
    }
}

/// A key of the ambient catalog. Unknown keys are accepted.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AmbientSoundSpec {
    pub id: String,
}

impl AmbientSoundSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_frequency_alias_is_accepted() {
        let spec: FrequencySpec = serde_json::from_str(
            r#"{"id":"theta-4.5","numericFrequency":4.5,"category":"theta"}"#,
        )
        .unwrap();
        assert_eq!(spec.frequency, 4.5);
        assert_eq!(spec.category, FrequencyCategory::Theta);
        assert!(spec.metadata.is_none());
    }

    #[test]
    fn metadata_is_optional_and_lenient() {
        let spec: FrequencySpec = serde_json::from_str(
            r#"{"id":"gateway-40.5","frequency":40.5,"category":"gamma",
                "metadata":{"name":"Focus 12","recommendedDuration":20}}"#,
        )
        .unwrap();
        let meta = spec.metadata.unwrap();
        assert_eq!(meta.name, "Focus 12");
        assert_eq!(meta.recommended_duration_minutes, Some(20.0));
        assert!(meta.tags.is_empty());
    }
}
