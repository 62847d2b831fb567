//! Page-side session.
//!
//! [`Session`] owns everything the page context keeps between messages: the
//! live document, its index, settings, the listening/speaking flags and the
//! pending timers. It is synchronous; anything that needs the network is
//! handed back to the caller as a [`RemoteJob`] or a key check, and the result is
//! fed in again through [`Session::finish_query`] / [`Session::finish_test_api`].

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use voxpage_config::{DEFAULT_HIGHLIGHT_MS, DEFAULT_REBUILD_DEBOUNCE_MS, VoxConfig};
use voxpage_page::{
    Debouncer, DocumentError, ElementHandle, Highlighter, NOT_FOUND_MESSAGE, Navigator, Page,
    PageContext, PageIndex, PageSummary, Selector, Viewport,
};
use voxpage_providers::{PageExcerpt, RemoteClient, RemoteError};
use voxpage_types::{ApiKey, Notification, Settings, SettingsPatch, Status};

use crate::classifier::{Classifier, Route};
use crate::protocol::{Ack, Request, Response};
use crate::speech::{RecognitionEvent, SpeechOutput, SpeechRecognizer, Utterance};

pub const LISTENING_PROMPT: &str = "I'm listening";
pub const MISSING_KEY_MESSAGE: &str = "Please set up your API key in the extension settings.";
pub const NO_KEY_TEST_MESSAGE: &str =
    "No API key provided. Please enter an API key in the settings.";
pub const TEST_SUCCESS_MESSAGE: &str = "API connection successful";
pub const EMPTY_QUERY_ERROR: &str = "Query is empty";

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub rebuild_debounce: Duration,
    pub highlight: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rebuild_debounce: Duration::from_millis(DEFAULT_REBUILD_DEBOUNCE_MS),
            highlight: Duration::from_millis(DEFAULT_HIGHLIGHT_MS),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_config(config: &VoxConfig) -> Self {
        Self {
            rebuild_debounce: config.rebuild_debounce(),
            highlight: config.highlight_duration(),
        }
    }
}

/// Broadcast side of the page-to-popup channel. Delivery is best effort.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        (Self { tx: Some(tx) }, rx)
    }

    /// Notifier with no listener; every notification is dropped.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, notification: Notification) {
        let Some(tx) = &self.tx else { return };
        if let Err(e) = tx.try_send(notification) {
            tracing::debug!("Notification not delivered: {e}");
        }
    }
}

/// Host-provided devices.
pub struct Host {
    pub speech: Box<dyn SpeechOutput>,
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub viewport: Box<dyn Viewport>,
}

/// A document mutation reported by the host. Targets are CSS selectors; the
/// first match is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEdit {
    Append { parent: String, html: String },
    Remove { target: String },
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("no element matches {0}")]
    NoMatch(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A remote question detached from the session so it can run concurrently.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub settings: Settings,
    pub question: String,
    pub page: PageExcerpt,
}

impl RemoteJob {
    pub async fn run(self, client: &RemoteClient) -> Result<String, RemoteError> {
        client.send(&self.settings, &self.question, &self.page).await
    }
}

#[derive(Debug)]
pub enum QueryStep {
    Done(String),
    Remote(RemoteJob),
}

#[derive(Debug)]
pub enum Outcome {
    Reply(Response),
    Remote(RemoteJob),
    KeyCheck(ApiKey),
}

pub struct Session {
    settings: Settings,
    page: Page,
    index: PageIndex,
    highlighter: Highlighter,
    debouncer: Debouncer,
    classifier: Classifier,
    navigator: Navigator,
    /// Set once the recognizer reports it started; cleared by stop or error.
    listening: bool,
    /// A recognizer start is outstanding and has not ended yet.
    recognizing: bool,
    speaking: bool,
    host: Host,
    notifier: Notifier,
}

impl Session {
    #[must_use]
    pub fn new(
        page: Page,
        settings: Settings,
        config: SessionConfig,
        host: Host,
        notifier: Notifier,
    ) -> Self {
        let index = PageIndex::build(&page);
        Self {
            settings,
            page,
            index,
            highlighter: Highlighter::new(config.highlight),
            debouncer: Debouncer::new(config.rebuild_debounce),
            classifier: Classifier::default(),
            navigator: Navigator,
            listening: false,
            recognizing: false,
            speaking: false,
            host,
            notifier,
        }
    }

    pub fn announce_ready(&self) {
        tracing::info!(url = %self.page.url(), "Page session ready");
        self.notifier.send(Notification::ContentScriptReady);
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    #[must_use]
    pub fn summary(&self) -> &PageSummary {
        self.index.summary()
    }

    #[must_use]
    pub fn index_builds(&self) -> u64 {
        self.index.builds()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn handle(&mut self, request: Request, now: Instant) -> Outcome {
        let response = match request {
            Request::Ping => Response::ack(Ack::Ok),
            Request::StartListening => {
                self.start_listening();
                Response::ack(Ack::Started)
            }
            Request::StopListening => {
                self.stop_listening();
                Response::ack(Ack::Stopped)
            }
            Request::ToggleVoiceInput => {
                if self.listening {
                    self.stop_listening();
                    Response::ack(Ack::Stopped)
                } else {
                    self.start_listening();
                    Response::ack(Ack::Started)
                }
            }
            Request::StopSpeech => {
                self.stop_speech();
                Response::ack(Ack::SpeechStopped)
            }
            Request::ProcessQuery { query } if query.trim().is_empty() => Response::Failure {
                error: EMPTY_QUERY_ERROR.to_string(),
            },
            Request::ProcessQuery { query } => match self.process_query(&query, now) {
                QueryStep::Done(response) => Response::Answer { response },
                QueryStep::Remote(job) => return Outcome::Remote(job),
            },
            Request::UpdateSettings { settings } => {
                self.update_settings(settings);
                Response::ack(Ack::SettingsUpdated)
            }
            Request::GetPageInfo => Response::PageInfo {
                url: self.page.url().to_string(),
                title: self.page.title(),
                dom_tree: self.index.summary().clone(),
            },
            Request::TestApi => return self.begin_test_api(),
        };
        Outcome::Reply(response)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn process_query(&mut self, query: &str, now: Instant) -> QueryStep {
        self.notifier.send(Notification::UpdateStatus {
            status: Status::Processing,
        });

        let context = PageContext::extract(&self.page, query);
        match self.classifier.classify(query, &context, &self.page) {
            Route::Navigation => {
                let spoken = match self.navigator.navigate(
                    query,
                    self.index.summary(),
                    &mut self.page,
                    self.host.viewport.as_mut(),
                    &mut self.highlighter,
                    now,
                ) {
                    Ok(confirmation) => confirmation,
                    Err(e) => {
                        tracing::info!("Navigation failed: {e}");
                        NOT_FOUND_MESSAGE.to_string()
                    }
                };
                self.speak(&spoken);
                QueryStep::Done(spoken)
            }
            Route::LocalAnswer(answer) => {
                self.deliver(&answer);
                QueryStep::Done(answer)
            }
            Route::Remote if self.settings.api_key.is_missing() => {
                tracing::info!("Missing API key");
                QueryStep::Done(self.finish_query(Err(RemoteError::MissingApiKey)))
            }
            Route::Remote => QueryStep::Remote(RemoteJob {
                settings: self.settings.clone(),
                question: query.to_string(),
                page: PageExcerpt {
                    excerpt: context.excerpt(),
                    title: context.title,
                },
            }),
        }
    }

    /// Deliver the outcome of a remote question. Failures become a spoken
    /// apology; the returned text is what was spoken.
    pub fn finish_query(&mut self, result: Result<String, RemoteError>) -> String {
        let answer = match result {
            Ok(answer) => answer,
            Err(RemoteError::MissingApiKey) => MISSING_KEY_MESSAGE.to_string(),
            Err(e) => {
                tracing::warn!("Remote query failed: {e}");
                self.notifier.send(Notification::UpdateStatus {
                    status: Status::Error,
                });
                format!(
                    "Sorry, I had trouble generating a response: {e}. \
                     Please check the API key and try again."
                )
            }
        };
        self.deliver(&answer);
        answer
    }

    fn deliver(&mut self, answer: &str) {
        self.notifier.send(Notification::NewAssistantMessage {
            message: answer.to_string(),
        });
        self.speak(answer);
    }

    fn begin_test_api(&mut self) -> Outcome {
        if self.settings.api_key.is_missing() {
            self.speak(NO_KEY_TEST_MESSAGE);
            return Outcome::Reply(Response::TestResult { success: false });
        }
        Outcome::KeyCheck(self.settings.api_key.clone())
    }

    /// Speak the key check result; returns whether the key works.
    pub fn finish_test_api(&mut self, result: Result<(), RemoteError>) -> bool {
        let (spoken, success) = match result {
            Ok(()) => (TEST_SUCCESS_MESSAGE.to_string(), true),
            Err(e @ RemoteError::Status { .. }) => {
                (format!("API connection failed: {}", e.reason()), false)
            }
            Err(e) => (format!("API test error: {e}"), false),
        };
        tracing::info!(success, "API test finished");
        self.speak(&spoken);
        success
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        if patch.is_empty() {
            return;
        }
        self.settings.apply(patch);
        tracing::info!(
            model = %self.settings.model,
            speech_rate = %self.settings.speech_rate,
            "Settings updated"
        );
    }

    // ------------------------------------------------------------------
    // Speech
    // ------------------------------------------------------------------

    /// Speak `text`, interrupting whatever is being spoken.
    pub fn speak(&mut self, text: &str) {
        if self.speaking {
            self.host.speech.cancel();
        }
        self.host.speech.speak(&Utterance {
            text: text.to_string(),
            rate: self.settings.speech_rate,
            voice: self.settings.voice_name.clone(),
        });
        self.speaking = true;
    }

    pub fn on_speech_finished(&mut self) {
        self.speaking = false;
        if self.listening {
            self.notifier.send(Notification::UpdateStatus {
                status: Status::Listening,
            });
        }
    }

    pub fn stop_speech(&mut self) {
        if self.speaking {
            self.host.speech.cancel();
            self.speaking = false;
        }
    }

    pub fn start_listening(&mut self) {
        if self.listening || self.recognizing {
            return;
        }
        self.recognizing = true;
        self.host.recognizer.start();
    }

    pub fn stop_listening(&mut self) {
        self.listening = false;
        if self.recognizing {
            self.host.recognizer.stop();
        }
        self.stop_speech();
    }

    pub fn on_recognition(&mut self, event: RecognitionEvent, now: Instant) -> Option<QueryStep> {
        match event {
            RecognitionEvent::Started => {
                self.listening = true;
                self.speak(LISTENING_PROMPT);
                self.notifier.send(Notification::UpdateStatus {
                    status: Status::Listening,
                });
            }
            RecognitionEvent::Transcript(transcript) => {
                self.notifier.send(Notification::NewUserMessage {
                    message: transcript.clone(),
                });
                return Some(self.process_query(&transcript, now));
            }
            RecognitionEvent::Error(error) => {
                tracing::warn!(%error, "Speech recognition error");
                self.notifier.send(Notification::RecognitionError { error });
                self.listening = false;
            }
            RecognitionEvent::Ended => {
                if self.listening {
                    self.host.recognizer.start();
                } else {
                    self.recognizing = false;
                    self.notifier.send(Notification::UpdateStatus {
                        status: Status::Inactive,
                    });
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Document mutation and timers
    // ------------------------------------------------------------------

    /// Apply a host mutation and schedule the debounced index rebuild.
    pub fn apply_edit(&mut self, edit: PageEdit, now: Instant) -> Result<(), EditError> {
        match &edit {
            PageEdit::Append { parent, html } => {
                let parent = self.locate(parent)?;
                self.page.append_html(parent, html)?;
            }
            PageEdit::Remove { target } => {
                let target = self.locate(target)?;
                self.page.remove(target)?;
            }
        }
        self.debouncer.notify(now);
        Ok(())
    }

    fn locate(&self, css: &str) -> Result<ElementHandle, EditError> {
        let selector =
            Selector::parse(css).map_err(|_| EditError::InvalidSelector(css.to_string()))?;
        self.page
            .first(&selector)
            .ok_or_else(|| EditError::NoMatch(css.to_string()))
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.debouncer.deadline(), self.highlighter.next_due()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Run whatever timers have come due.
    pub fn on_timer(&mut self, now: Instant) {
        if self.debouncer.fire_if_due(now) {
            self.index.rebuild(&self.page);
        }
        let restored = self.highlighter.restore_due(&mut self.page, now);
        if restored > 0 {
            tracing::debug!(restored, "Highlights restored");
        }
    }
}
