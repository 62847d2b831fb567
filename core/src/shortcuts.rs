//! Keyboard shortcuts and named extension commands.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::popup::PageChannel;
use crate::protocol::Request;

pub const TOGGLE_VOICE_SHORTCUT: &str = "Alt+Shift+V";
pub const STOP_SPEECH_SHORTCUT: &str = "Alt+Shift+S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleVoiceInput,
    StopSpeech,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::ToggleVoiceInput, Command::StopSpeech];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ToggleVoiceInput => "toggle_voice_input",
            Self::StopSpeech => "stop_speech",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    /// Default key binding.
    #[must_use]
    pub const fn shortcut(self) -> &'static str {
        match self {
            Self::ToggleVoiceInput => TOGGLE_VOICE_SHORTCUT,
            Self::StopSpeech => STOP_SPEECH_SHORTCUT,
        }
    }

    #[must_use]
    pub fn request(self) -> Request {
        match self {
            Self::ToggleVoiceInput => Request::ToggleVoiceInput,
            Self::StopSpeech => Request::StopSpeech,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("empty shortcut")]
    Empty,
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("shortcut key must be a single character, got '{0}'")]
    InvalidKey(String),
}

/// A key press with modifiers, as reported by a keydown event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub key: char,
}

impl KeyChord {
    /// The command bound to this chord. Matches on the reported key exactly,
    /// so `Alt+Shift+v` (shift not applied) does not trigger.
    #[must_use]
    pub fn command(self) -> Option<Command> {
        Command::ALL.into_iter().find(|command| {
            command
                .shortcut()
                .parse::<KeyChord>()
                .is_ok_and(|bound| bound == self)
        })
    }
}

impl FromStr for KeyChord {
    type Err = ShortcutError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = raw.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty()).ok_or(ShortcutError::Empty)?;

        let mut chord = KeyChord {
            ctrl: false,
            alt: false,
            shift: false,
            key: ' ',
        };
        for modifier in parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" => chord.alt = true,
                "shift" => chord.shift = true,
                _ => return Err(ShortcutError::UnknownModifier(modifier.to_string())),
            }
        }

        let mut chars = key.chars();
        chord.key = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(ShortcutError::InvalidKey(key.to_string())),
        };
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Deliver a named command to the active page. Failures are logged.
pub async fn run_command<C: PageChannel>(channel: &C, name: &str) {
    let Some(command) = Command::from_name(name) else {
        tracing::debug!(name, "Ignoring unknown command");
        return;
    };
    if let Err(e) = channel.request(command.request()).await {
        tracing::info!(command = command.name(), "Error sending command: {e}");
    }
}
