//! User settings shared by the page and popup contexts.
//!
//! `Settings` is the fully-resolved value: every field has a concrete default.
//! `SettingsPatch` is the partial form carried by `updateSettings` messages.
//! Neither performs validation beyond type coercion; a bad API key only
//! surfaces when a remote call fails.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{ApiKey, ModelChoice};

pub const DEFAULT_SPEECH_RATE: f64 = 1.0;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("speech rate {0:?} is not a number")]
    InvalidSpeechRate(String),
}

/// Text-to-speech rate multiplier.
///
/// Accepts either a number or a numeric string on deserialization, the same
/// coercion the settings UI applies to its slider value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SpeechRate(f64);

impl SpeechRate {
    #[must_use]
    pub const fn new(rate: f64) -> Self {
        Self(rate)
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|rate| rate.is_finite())
            .map(Self)
            .ok_or_else(|| SettingsError::InvalidSpeechRate(raw.to_string()))
    }
}

impl Default for SpeechRate {
    fn default() -> Self {
        Self(DEFAULT_SPEECH_RATE)
    }
}

impl std::fmt::Display for SpeechRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl Serialize for SpeechRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for SpeechRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(rate) if rate.is_finite() => Ok(Self(rate)),
            Raw::Number(rate) => Err(serde::de::Error::custom(
                SettingsError::InvalidSpeechRate(rate.to_string()),
            )),
            Raw::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Resolved settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: ApiKey,
    pub model: ModelChoice,
    pub speech_rate: SpeechRate,
    /// Preferred synthesis voice. `None` means the engine default.
    #[serde(deserialize_with = "empty_as_none")]
    pub voice_name: Option<String>,
}

impl Settings {
    /// Merge a partial update. Fields absent from the patch are untouched.
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(api_key) = patch.api_key {
            self.api_key = api_key;
        }
        if let Some(model) = patch.model {
            self.model = model;
        }
        if let Some(rate) = patch.speech_rate {
            self.speech_rate = rate;
        }
        if let Some(voice) = patch.voice_name {
            self.voice_name = non_empty(voice);
        }
    }
}

/// Partial settings update (`updateSettings{settings}` payload).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_rate: Option<SpeechRate>,
    /// An empty string clears the voice preference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
}

impl SettingsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.model.is_none()
            && self.speech_rate.is_none()
            && self.voice_name.is_none()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.and_then(non_empty))
}
