//! Shared test utilities and fixtures
//!
//! Builds a page agent with recording host devices and points its remote
//! client at a wiremock server.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use voxpage_core::{
    Host, Notifier, PageAgent, PageHandle, Session, SessionConfig, SpeechOutput,
    SpeechRecognizer, Utterance,
};
use voxpage_page::{ElementHandle, Page, Url, Viewport};
use voxpage_providers::RemoteClient;
use voxpage_types::{ApiKey, Notification, Settings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub const PAGE_URL: &str = "https://example.com/";

pub const EXAMPLE_DOMAIN: &str = r#"<!doctype html>
<html>
<head><title>Example Domain</title></head>
<body>
<div>
<h1>Example Domain</h1>
<p>This domain is for use in illustrative examples in documents.</p>
<p><a href="https://www.iana.org/domains/example">More information...</a></p>
</div>
</body>
</html>"#;

pub const WIDGETS_PAGE: &str = r#"<!doctype html>
<html>
<head><title>Acme Widgets</title></head>
<body>
<article>
<h1>Acme Widgets</h1>
<p>Widgets for every workshop.</p>
<h2>Pricing</h2>
<p>Plans start at five dollars a month.</p>
<h2>Support</h2>
<p>Email us any time.</p>
</article>
</body>
</html>"#;

/// Speech output that records what was said.
#[derive(Debug, Default, Clone)]
pub struct Spoken(Rc<RefCell<Vec<String>>>);

impl Spoken {
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl SpeechOutput for Spoken {
    fn speak(&mut self, utterance: &Utterance) {
        self.0.borrow_mut().push(utterance.text.clone());
    }

    fn cancel(&mut self) {}
}

/// Recognizer that counts start calls and never hears anything.
#[derive(Debug, Default, Clone)]
pub struct Recognizer(Rc<Cell<usize>>);

impl Recognizer {
    pub fn starts(&self) -> usize {
        self.0.get()
    }
}

impl SpeechRecognizer for Recognizer {
    fn start(&mut self) {
        self.0.set(self.0.get() + 1);
    }

    fn stop(&mut self) {}
}

pub struct Inert;

impl Viewport for Inert {
    fn scroll_to_center(&mut self, _page: &Page, _element: ElementHandle) {}
}

/// Host whose devices record nothing anyone looks at.
pub fn quiet_host() -> Host {
    Host {
        speech: Box::new(Spoken::default()),
        recognizer: Box::new(Recognizer::default()),
        viewport: Box::new(Inert),
    }
}

pub struct Harness {
    pub handle: PageHandle,
    pub agent: PageAgent,
    pub notifications: mpsc::Receiver<Notification>,
    pub spoken: Spoken,
    pub recognizer: Recognizer,
}

pub fn harness(html: &str, settings: Settings, client: RemoteClient) -> Harness {
    let (handle, inbox) = PageHandle::channel(PAGE_URL);
    let (notifier, notifications) = Notifier::channel();
    let spoken = Spoken::default();
    let recognizer = Recognizer::default();
    let host = Host {
        speech: Box::new(spoken.clone()),
        recognizer: Box::new(recognizer.clone()),
        viewport: Box::new(Inert),
    };
    let page = Page::parse(html, Url::parse(PAGE_URL).unwrap());
    let session = Session::new(page, settings, SessionConfig::default(), host, notifier);
    Harness {
        handle,
        agent: PageAgent::new(session, client, inbox),
        notifications,
        spoken,
        recognizer,
    }
}

pub fn settings_with_key(key: &str) -> Settings {
    Settings {
        api_key: ApiKey::new(key),
        ..Settings::default()
    }
}

pub fn client_for(server: &MockServer) -> RemoteClient {
    RemoteClient::for_endpoint(&format!("{}{COMPLETIONS_PATH}", server.uri()))
}

/// Client for tests that must never reach the network.
pub fn unreachable_client() -> RemoteClient {
    RemoteClient::for_endpoint("http://127.0.0.1:9/v1/chat/completions")
}

/// Mount a successful chat completion
pub async fn mount_completion(server: &MockServer, content: &str) {
    mount_slow_completion(server, content, Duration::ZERO).await;
}

/// Mount a successful chat completion that answers after `delay`.
pub async fn mount_slow_completion(server: &MockServer, content: &str, delay: Duration) {
    let body = serde_json::json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "model": "mistral-large-latest",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    });

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Everything broadcast so far.
pub fn drain(notifications: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        out.push(notification);
    }
    out
}
