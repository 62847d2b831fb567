//! Popup-side state.
//!
//! The popup talks to the page only through a [`PageChannel`]. It keeps its
//! own conversation view, built from the page's notifications, and persists
//! settings changes before forwarding them to the page.

use std::future::Future;
use std::time::Duration;

use voxpage_config::{ConfigError, SettingsStore};
use voxpage_types::{
    ApiKey, Conversation, ModelChoice, Notification, Role, Settings, SettingsPatch, SpeechRate,
    Status,
};

use crate::agent::PageHandle;
use crate::protocol::{Ack, ChannelError, Request, Response};

pub const RESTRICTED_PAGE_MESSAGE: &str = "voxpage cannot run on Chrome internal pages.";
pub const CONNECT_FAILED_MESSAGE: &str =
    "Could not connect to page. Try refreshing the page and reopening the extension.";
pub const UNEXPECTED_PING_MESSAGE: &str = "Unexpected response from content script.";

const RESTRICTED_SCHEMES: &[&str] = &["chrome://", "chrome-extension://", "chrome-search://"];

const DEFAULT_CONNECT_RETRIES: u32 = 3;
const DEFAULT_CONNECT_BACKOFF_MS: u64 = 300;

/// Request/response link to the page context of the active tab.
pub trait PageChannel {
    /// URL of the page on the other end.
    fn url(&self) -> &str;

    fn request(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, ChannelError>> + Send;
}

impl PageChannel for PageHandle {
    fn url(&self) -> &str {
        PageHandle::url(self)
    }

    fn request(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, ChannelError>> + Send {
        PageHandle::request(self, request)
    }
}

#[must_use]
pub fn is_restricted_url(url: &str) -> bool {
    RESTRICTED_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Bounded retry for the initial ping: `retries` extra attempts, each after a
/// fixed `backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_CONNECT_RETRIES,
            backoff: Duration::from_millis(DEFAULT_CONNECT_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Pending,
    Connected,
    /// Persistent error state; the message is shown in place of the
    /// conversation.
    Failed(String),
}

pub struct PopupState<C> {
    channel: C,
    store: SettingsStore,
    retry: RetryPolicy,
    connection: Connection,
    conversation: Conversation,
    status: Status,
    listening: bool,
    settings: Settings,
}

impl<C: PageChannel> PopupState<C> {
    pub fn new(channel: C, store: SettingsStore) -> Self {
        Self {
            channel,
            store,
            retry: RetryPolicy::default(),
            connection: Connection::Pending,
            conversation: Conversation::new(),
            status: Status::Inactive,
            listening: false,
            settings: Settings::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check the page can host the assistant, ping it with bounded retry,
    /// then load settings and page info.
    pub async fn connect(&mut self) -> &Connection {
        if is_restricted_url(self.channel.url()) {
            self.fail(RESTRICTED_PAGE_MESSAGE);
            return &self.connection;
        }

        for attempt in 0..=self.retry.retries {
            match self.channel.request(Request::Ping).await {
                Ok(Response::Status { status: Ack::Ok }) => {
                    tracing::info!(attempt = attempt + 1, "Connected to page");
                    self.connection = Connection::Connected;
                    self.initialize().await;
                    return &self.connection;
                }
                Ok(other) => {
                    tracing::warn!(?other, "Unexpected ping reply");
                    self.fail(UNEXPECTED_PING_MESSAGE);
                    return &self.connection;
                }
                Err(e) => {
                    tracing::info!("Attempt {} failed: {e}", attempt + 1);
                    if attempt < self.retry.retries {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        self.fail(CONNECT_FAILED_MESSAGE);
        &self.connection
    }

    fn fail(&mut self, message: &str) {
        tracing::warn!(message, "Popup connection failed");
        self.conversation = Conversation::new();
        self.conversation.push(Role::System, message);
        self.status = Status::Error;
        self.connection = Connection::Failed(message.to_string());
    }

    async fn initialize(&mut self) {
        self.settings = self.store.load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings: {e}");
            Settings::default()
        });

        match self.channel.request(Request::GetPageInfo).await {
            Ok(Response::PageInfo { title, .. }) => {
                self.conversation
                    .push(Role::System, format!("Currently on: {title}"));
            }
            Ok(other) => tracing::debug!(?other, "Ignoring page info reply"),
            Err(e) => tracing::info!("Error getting page info: {e}"),
        }
    }

    pub fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::ContentScriptReady => tracing::debug!("Page context ready"),
            Notification::UpdateStatus { status } => self.status = status,
            Notification::NewUserMessage { message } => {
                self.conversation.push(Role::User, message);
            }
            Notification::NewAssistantMessage { message } => {
                self.conversation.push(Role::Assistant, message);
            }
            Notification::RecognitionError { error } => {
                self.status = Status::Error;
                self.conversation.push(Role::System, format!("Error: {error}"));
            }
        }
    }

    pub async fn toggle_listening(&mut self) {
        let (request, listening, status) = if self.listening {
            (Request::StopListening, false, Status::Inactive)
        } else {
            (Request::StartListening, true, Status::Listening)
        };
        match self.channel.request(request).await {
            Ok(_) => {
                self.listening = listening;
                self.status = status;
            }
            Err(e) => tracing::info!("Error toggling listening: {e}"),
        }
    }

    pub async fn save_api_key(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.persist(SettingsPatch {
            api_key: Some(ApiKey::new(raw.trim())),
            ..SettingsPatch::default()
        })
        .await
    }

    pub async fn save_model(&mut self, model: ModelChoice) -> Result<(), ConfigError> {
        self.persist(SettingsPatch {
            model: Some(model),
            ..SettingsPatch::default()
        })
        .await
    }

    /// Persist a new rate; returns the label shown next to the slider.
    pub async fn set_speech_rate(&mut self, rate: f64) -> Result<String, ConfigError> {
        let rate = SpeechRate::new(rate);
        self.persist(SettingsPatch {
            speech_rate: Some(rate),
            ..SettingsPatch::default()
        })
        .await?;
        Ok(rate.to_string())
    }

    pub async fn set_voice(&mut self, voice_name: &str) -> Result<(), ConfigError> {
        self.persist(SettingsPatch {
            voice_name: Some(voice_name.to_string()),
            ..SettingsPatch::default()
        })
        .await
    }

    async fn persist(&mut self, patch: SettingsPatch) -> Result<(), ConfigError> {
        self.settings = self.store.apply(patch.clone())?;
        if let Err(e) = self
            .channel
            .request(Request::UpdateSettings { settings: patch })
            .await
        {
            tracing::info!("Error updating settings: {e}");
        }
        Ok(())
    }

    pub async fn test_api(&mut self) {
        self.conversation
            .push(Role::System, "Testing API connection...");
        let message = match self.channel.request(Request::TestApi).await {
            Ok(Response::TestResult { success: true }) => "API connection successful!".to_string(),
            Ok(Response::Failure { error }) => format!("API connection failed: {error}"),
            Ok(_) => "API test completed but received an unexpected response.".to_string(),
            Err(e) => format!("Error testing API: {e}"),
        };
        self.conversation.push(Role::System, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::ready;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use voxpage_page::PageSummary;

    struct FakePage {
        url: String,
        replies: Mutex<VecDeque<Result<Response, ChannelError>>>,
        sent: Mutex<Vec<Request>>,
    }

    impl FakePage {
        fn new(url: &str, replies: Vec<Result<Response, ChannelError>>) -> Self {
            Self {
                url: url.to_string(),
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<Request> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl PageChannel for FakePage {
        fn url(&self) -> &str {
            &self.url
        }

        fn request(
            &self,
            request: Request,
        ) -> impl Future<Output = Result<Response, ChannelError>> + Send {
            self.sent.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ChannelError::Disconnected));
            ready(reply)
        }
    }

    fn page_info(title: &str) -> Result<Response, ChannelError> {
        Ok(Response::PageInfo {
            url: "https://example.com/".to_string(),
            title: title.to_string(),
            dom_tree: PageSummary::default(),
        })
    }

    fn popup(dir: &TempDir, page: FakePage) -> PopupState<FakePage> {
        PopupState::new(page, SettingsStore::at(dir.path().join("config.toml")))
    }

    fn texts(state: &PopupState<FakePage>) -> Vec<String> {
        state
            .conversation()
            .entries()
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn restricted_pages_fail_without_pinging() {
        let dir = TempDir::new().unwrap();
        let mut state = popup(&dir, FakePage::new("chrome://settings", vec![]));

        let connection = state.connect().await.clone();

        assert_eq!(
            connection,
            Connection::Failed(RESTRICTED_PAGE_MESSAGE.to_string())
        );
        assert!(state.channel.sent().is_empty());
        assert_eq!(state.status(), Status::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_then_gives_up() {
        let dir = TempDir::new().unwrap();
        let mut state = popup(&dir, FakePage::new("https://example.com/", vec![]));
        let started = tokio::time::Instant::now();

        let connection = state.connect().await.clone();

        assert_eq!(
            connection,
            Connection::Failed(CONNECT_FAILED_MESSAGE.to_string())
        );
        assert_eq!(state.channel.sent().len(), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(900));
        assert_eq!(texts(&state), vec![CONNECT_FAILED_MESSAGE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_succeeds_after_a_retry() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new(
            "https://example.com/",
            vec![
                Err(ChannelError::Disconnected),
                Ok(Response::ack(Ack::Ok)),
                page_info("Example Domain"),
            ],
        );
        let mut state = popup(&dir, page);

        assert_eq!(state.connect().await, &Connection::Connected);
        assert_eq!(texts(&state), vec!["Currently on: Example Domain".to_string()]);
        assert_eq!(
            state.channel.sent(),
            vec![Request::Ping, Request::Ping, Request::GetPageInfo]
        );
    }

    #[tokio::test]
    async fn unexpected_ping_reply_is_an_error() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new(
            "https://example.com/",
            vec![Ok(Response::TestResult { success: true })],
        );
        let mut state = popup(&dir, page);
        assert_eq!(
            state.connect().await,
            &Connection::Failed(UNEXPECTED_PING_MESSAGE.to_string())
        );
    }

    #[test]
    fn notifications_build_the_conversation() {
        let dir = TempDir::new().unwrap();
        let mut state = popup(&dir, FakePage::new("https://example.com/", vec![]));

        state.handle_notification(Notification::UpdateStatus {
            status: Status::Processing,
        });
        assert_eq!(state.status(), Status::Processing);

        state.handle_notification(Notification::NewUserMessage {
            message: "hi there".to_string(),
        });
        state.handle_notification(Notification::NewAssistantMessage {
            message: "Hello!".to_string(),
        });
        state.handle_notification(Notification::RecognitionError {
            error: "no-speech".to_string(),
        });

        let roles: Vec<Role> = state
            .conversation()
            .entries()
            .iter()
            .map(|entry| entry.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
        assert_eq!(texts(&state)[2], "Error: no-speech");
        assert_eq!(state.status(), Status::Error);
    }

    #[tokio::test]
    async fn toggle_listening_tracks_page_acks() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new(
            "https://example.com/",
            vec![
                Ok(Response::ack(Ack::Started)),
                Err(ChannelError::NoResponse),
            ],
        );
        let mut state = popup(&dir, page);

        state.toggle_listening().await;
        assert!(state.is_listening());
        assert_eq!(state.status(), Status::Listening);

        // Failed stop leaves the state untouched.
        state.toggle_listening().await;
        assert!(state.is_listening());
        assert_eq!(
            state.channel.sent(),
            vec![Request::StartListening, Request::StopListening]
        );
    }

    #[tokio::test]
    async fn settings_changes_persist_and_reach_the_page() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new(
            "https://example.com/",
            vec![
                Ok(Response::ack(Ack::SettingsUpdated)),
                Ok(Response::ack(Ack::SettingsUpdated)),
            ],
        );
        let mut state = popup(&dir, page);

        state.save_api_key("  sk-test  ").await.unwrap();
        let label = state.set_speech_rate(1.5).await.unwrap();
        // Page unreachable: still persisted.
        state.save_model(ModelChoice::Small).await.unwrap();

        assert_eq!(label, "1.5");
        let stored = state.store.load().unwrap();
        assert_eq!(stored.api_key.as_str(), "sk-test");
        assert_eq!(stored.speech_rate, SpeechRate::new(1.5));
        assert_eq!(stored.model, ModelChoice::Small);
        assert_eq!(state.settings(), &stored);

        let sent = state.channel.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[0],
            Request::UpdateSettings {
                settings: SettingsPatch {
                    api_key: Some(ApiKey::new("sk-test")),
                    ..SettingsPatch::default()
                }
            }
        );
    }

    #[tokio::test]
    async fn test_api_reports_each_outcome() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new(
            "https://example.com/",
            vec![
                Ok(Response::TestResult { success: true }),
                Ok(Response::Failure {
                    error: "boom".to_string(),
                }),
                Ok(Response::TestResult { success: false }),
                Err(ChannelError::NoResponse),
            ],
        );
        let mut state = popup(&dir, page);
        for _ in 0..4 {
            state.test_api().await;
        }

        let texts = texts(&state);
        assert_eq!(texts[1], "API connection successful!");
        assert_eq!(texts[3], "API connection failed: boom");
        assert_eq!(
            texts[5],
            "API test completed but received an unexpected response."
        );
        assert_eq!(
            texts[7],
            format!("Error testing API: {}", ChannelError::NoResponse)
        );
    }
}
