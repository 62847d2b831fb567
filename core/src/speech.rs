//! Speech engine seams.
//!
//! The host owns the actual synthesizer and recognizer. The session drives
//! them through these traits and learns about their progress through
//! [`RecognitionEvent`]s and speech-finished events fed back into the agent.

use voxpage_types::SpeechRate;

/// One utterance handed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: SpeechRate,
    /// Preferred voice; `None` lets the host choose.
    pub voice: Option<String>,
}

pub trait SpeechOutput {
    fn speak(&mut self, utterance: &Utterance);
    fn cancel(&mut self);
}

/// Single-shot recognizer: one `start` yields at most one transcript and
/// always ends with [`RecognitionEvent::Ended`].
pub trait SpeechRecognizer {
    fn start(&mut self);
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Transcript(String),
    Error(String),
    Ended,
}
