//! Terminal stand-ins for the host devices a page context drives.

use voxpage_core::{HostLink, RecognitionEvent, SpeechOutput, SpeechRecognizer, Utterance};
use voxpage_page::{ElementHandle, Page, Viewport};

/// Prints each utterance and reports it finished straight away.
pub struct ConsoleSpeech {
    link: HostLink,
}

impl ConsoleSpeech {
    pub fn new(link: HostLink) -> Self {
        Self { link }
    }
}

impl SpeechOutput for ConsoleSpeech {
    fn speak(&mut self, utterance: &Utterance) {
        match &utterance.voice {
            Some(voice) => println!("[speaking x{} as {voice}] {}", utterance.rate, utterance.text),
            None => println!("[speaking x{}] {}", utterance.rate, utterance.text),
        }
        if let Err(e) = self.link.speech_finished() {
            tracing::debug!("Speech end not delivered: {e}");
        }
    }

    fn cancel(&mut self) {
        tracing::debug!("Speech cancelled");
    }
}

/// Recognizer whose transcripts are typed lines. Starting and stopping only
/// report the matching lifecycle events.
pub struct ConsoleRecognizer {
    link: HostLink,
}

impl ConsoleRecognizer {
    pub fn new(link: HostLink) -> Self {
        Self { link }
    }

    fn report(&self, event: RecognitionEvent) {
        if let Err(e) = self.link.recognition(event) {
            tracing::debug!("Recognition event not delivered: {e}");
        }
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn start(&mut self) {
        self.report(RecognitionEvent::Started);
    }

    fn stop(&mut self) {
        self.report(RecognitionEvent::Ended);
    }
}

pub struct ConsoleViewport;

impl Viewport for ConsoleViewport {
    fn scroll_to_center(&mut self, page: &Page, element: ElementHandle) {
        match page.element(element) {
            Ok(el) => println!("(scrolled to <{}>)", el.value().name()),
            Err(e) => tracing::debug!("Scroll target gone: {e}"),
        }
    }
}
