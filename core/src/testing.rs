//! Recording host devices for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use voxpage_page::{ElementHandle, Page, Viewport};

use crate::session::Host;
use crate::speech::{SpeechOutput, SpeechRecognizer, Utterance};

#[derive(Debug, Default)]
struct Log {
    utterances: Vec<Utterance>,
    cancels: usize,
    scrolls: usize,
    recognizer_starts: usize,
    recognizer_stops: usize,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Recorder(Rc<RefCell<Log>>);

impl Recorder {
    pub(crate) fn utterances(&self) -> Vec<Utterance> {
        self.0.borrow().utterances.clone()
    }

    pub(crate) fn spoken(&self) -> Vec<String> {
        self.0
            .borrow()
            .utterances
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub(crate) fn cancels(&self) -> usize {
        self.0.borrow().cancels
    }

    pub(crate) fn scrolls(&self) -> usize {
        self.0.borrow().scrolls
    }

    pub(crate) fn recognizer_starts(&self) -> usize {
        self.0.borrow().recognizer_starts
    }

    pub(crate) fn recognizer_stops(&self) -> usize {
        self.0.borrow().recognizer_stops
    }
}

impl SpeechOutput for Recorder {
    fn speak(&mut self, utterance: &Utterance) {
        self.0.borrow_mut().utterances.push(utterance.clone());
    }

    fn cancel(&mut self) {
        self.0.borrow_mut().cancels += 1;
    }
}

impl SpeechRecognizer for Recorder {
    fn start(&mut self) {
        self.0.borrow_mut().recognizer_starts += 1;
    }

    fn stop(&mut self) {
        self.0.borrow_mut().recognizer_stops += 1;
    }
}

impl Viewport for Recorder {
    fn scroll_to_center(&mut self, _page: &Page, _element: ElementHandle) {
        self.0.borrow_mut().scrolls += 1;
    }
}

pub(crate) fn host(recorder: &Recorder) -> Host {
    Host {
        speech: Box::new(recorder.clone()),
        recognizer: Box::new(recorder.clone()),
        viewport: Box::new(recorder.clone()),
    }
}
