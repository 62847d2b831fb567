//! Core domain types for voxpage.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from either execution context (page or popup).

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod conversation;
mod notification;
mod settings;

pub use conversation::{Conversation, ConversationEntry, Role};
pub use notification::{Notification, Status};
pub use settings::{Settings, SettingsError, SettingsPatch, SpeechRate};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Credentials
// ============================================================================

/// Bearer token for the remote language-model API.
///
/// An empty key is representable: the settings store defaults to it, and the
/// remote client short-circuits on it before touching the network.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(<empty>)")
        } else {
            write!(f, "ApiKey(<redacted>)")
        }
    }
}

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no usable key has been configured (empty or whitespace).
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ApiKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

// ============================================================================
// Model selection
// ============================================================================

/// Backend model family prefix.
pub const MODEL_FAMILY: &str = "mistral";

/// User-facing model choice.
///
/// Stored as `"small"` or `"large"`. Parsing is lenient: anything that is not
/// recognizably "large" selects the small model, matching how the backend
/// identifier is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModelChoice {
    Small,
    #[default]
    Large,
}

impl ModelChoice {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Large => "large",
        }
    }

    /// Lenient parse. Accepts the short names and the legacy `mistral-*` names.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "large" | "mistral-large" => Self::Large,
            _ => Self::Small,
        }
    }

    /// Concrete model identifier sent to the remote API.
    #[must_use]
    pub fn backend_model(self) -> String {
        format!("{MODEL_FAMILY}-{}-latest", self.as_str())
    }
}

impl std::fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ModelChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModelChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|raw| Self::parse(&raw))
    }
}
