//! Broadcast notifications from the page context to the popup.
//!
//! These are fire-and-forget: no response is expected and delivery is not
//! guaranteed when the popup is closed.

use serde::{Deserialize, Serialize};

/// Listening/processing indicator shown by the popup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Listening,
    Processing,
    #[default]
    Inactive,
    Error,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    /// Capitalized label for the status text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Listening => "Listening",
            Self::Processing => "Processing",
            Self::Inactive => "Inactive",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notification {
    ContentScriptReady,
    UpdateStatus { status: Status },
    NewUserMessage { message: String },
    NewAssistantMessage { message: String },
    RecognitionError { error: String },
}
