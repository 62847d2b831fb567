//! Requests the popup (or a keyboard command) sends to the page, and the
//! replies the page sends back.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use voxpage_page::PageSummary;
use voxpage_types::SettingsPatch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Ping,
    StartListening,
    StopListening,
    ToggleVoiceInput,
    StopSpeech,
    ProcessQuery { query: String },
    UpdateSettings { settings: SettingsPatch },
    GetPageInfo,
    TestApi,
}

impl Request {
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::StartListening => "startListening",
            Self::StopListening => "stopListening",
            Self::ToggleVoiceInput => "toggleVoiceInput",
            Self::StopSpeech => "stopSpeech",
            Self::ProcessQuery { .. } => "processQuery",
            Self::UpdateSettings { .. } => "updateSettings",
            Self::GetPageInfo => "getPageInfo",
            Self::TestApi => "testApi",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    Ok,
    Started,
    Stopped,
    SpeechStopped,
    SettingsUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status {
        status: Ack,
    },
    Answer {
        response: String,
    },
    Failure {
        error: String,
    },
    PageInfo {
        url: String,
        title: String,
        #[serde(rename = "domTree")]
        dom_tree: PageSummary,
    },
    TestResult {
        success: bool,
    },
}

impl Response {
    #[must_use]
    pub const fn ack(status: Ack) -> Self {
        Self::Status { status }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Could not establish connection. Receiving end does not exist.")]
    Disconnected,
    #[error("The message port closed before a response was received.")]
    NoResponse,
}
