//! voxpage CLI - loads a page and talks to it from the terminal.
//!
//! # Architecture
//!
//! ```text
//! stdin ──► Driver ──► PopupState ──PageHandle──► PageAgent ──► Session
//!             ▲                                       │
//!             └──────────── Notification ─────────────┘
//! ```
//!
//! The terminal plays both sides of the extension: the popup (commands,
//! settings, conversation view) and the host devices the page context
//! drives (speech output goes to stdout, the recognizer is fed from stdin
//! while listening). Logs go to a file so stdout stays readable.

mod devices;

use anyhow::{Context, Result, bail};
use std::{
    env,
    fmt::Display,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use voxpage_config::{SettingsStore, VoxConfig, config_dir};
use voxpage_core::{
    Host, HostLink, KeyChord, Notifier, PageAgent, PageEdit, PageHandle, PopupState,
    RecognitionEvent, Request, Response, Session, SessionConfig, run_command,
};
use voxpage_page::{Page, Url};
use voxpage_providers::RemoteClient;
use voxpage_types::{ModelChoice, Notification, Role};

use devices::{ConsoleRecognizer, ConsoleSpeech, ConsoleViewport};

const USAGE: &str = "usage: voxpage <page.html> [url]";

const HELP: &str = "\
Type a question to ask about the page.
  /listen               toggle voice input (typed lines become transcripts)
  /stop                 stop speech
  /test                 test the API connection
  /info                 print the page summary
  /key <api key>        save the API key
  /model <small|large>  choose the model
  /rate <n>             set the speech rate
  /voice <name>         set the voice (empty clears)
  /append <css> <html>  append markup to the first match
  /remove <css>         remove the first match
  Alt+Shift+V           keyboard shortcuts are accepted as typed chords
  /quit";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Spoken output owns stdout; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.voxpage/logs/voxpage.log
    if let Some(dir) = config_dir() {
        candidates.push(dir.join("logs").join("voxpage.log"));
    }

    // Fallback: ./.voxpage/logs/voxpage.log
    candidates.push(PathBuf::from(".voxpage").join("logs").join("voxpage.log"));

    candidates
}

fn page_url(path: &Path, raw: Option<&str>) -> Result<Url> {
    if let Some(raw) = raw {
        return Url::parse(raw).with_context(|| format!("invalid url: {raw}"));
    }
    let absolute = fs::canonicalize(path)
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    match Url::from_file_path(&absolute) {
        Ok(url) => Ok(url),
        Err(()) => bail!("cannot build a file url for {}", absolute.display()),
    }
}

fn load_config(store: &SettingsStore) -> VoxConfig {
    store.load_config().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {e}");
        VoxConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args = env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        bail!(USAGE);
    };
    let url = page_url(&path, args.next().as_deref())?;
    let html =
        fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;

    let store = SettingsStore::open_default()?;
    let config = load_config(&store);
    let client = match config.endpoint() {
        Some(endpoint) => RemoteClient::for_endpoint(endpoint),
        None => RemoteClient::new(),
    };

    let (handle, inbox) = PageHandle::channel(url.as_str());
    let (notifier, notifications) = Notifier::channel();
    let link = handle.host_link();
    let host = Host {
        speech: Box::new(ConsoleSpeech::new(link.clone())),
        recognizer: Box::new(ConsoleRecognizer::new(link.clone())),
        viewport: Box::new(ConsoleViewport),
    };
    let session = Session::new(
        Page::parse(&html, url),
        config.resolved_settings(),
        SessionConfig::from_config(&config),
        host,
        notifier,
    );
    let agent = PageAgent::new(session, client, inbox);

    println!("{HELP}");
    let popup = PopupState::new(handle.clone(), store);
    let driver = Driver {
        popup,
        handle,
        link,
        printed: 0,
    };

    let (_, result) = tokio::join!(agent.run(), driver.run(notifications));
    result
}

/// Terminal side: popup state plus the recognizer's input.
struct Driver {
    popup: PopupState<PageHandle>,
    handle: PageHandle,
    link: HostLink,
    /// Conversation entries already written to stdout.
    printed: usize,
}

impl Driver {
    async fn run(mut self, mut notifications: mpsc::Receiver<Notification>) -> Result<()> {
        self.popup.connect().await;
        self.flush_conversation();

        let mut lines = BufReader::new(stdin()).lines();
        loop {
            tokio::select! {
                Some(notification) = notifications.recv() => {
                    self.popup.handle_notification(notification);
                    self.flush_conversation();
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.handle_line(line.trim()).await {
                        break;
                    }
                    self.flush_conversation();
                }
            }
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Returns false when the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        if let Ok(chord) = line.parse::<KeyChord>()
            && let Some(command) = chord.command()
        {
            run_command(&self.handle, command.name()).await;
            return true;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "/quit" => return false,
            "/listen" => self.popup.toggle_listening().await,
            "/stop" => run_command(&self.handle, "stop_speech").await,
            "/test" => self.popup.test_api().await,
            "/info" => self.print_info().await,
            "/key" => report(self.popup.save_api_key(rest).await),
            "/model" => report(self.popup.save_model(ModelChoice::parse(rest)).await),
            "/rate" => match rest.parse::<f64>() {
                Ok(rate) => match self.popup.set_speech_rate(rate).await {
                    Ok(label) => println!("speech rate {label}"),
                    Err(e) => eprintln!("error: {e}"),
                },
                Err(_) => eprintln!("error: not a number: {rest}"),
            },
            "/voice" => report(self.popup.set_voice(rest).await),
            "/append" => {
                let (parent, html) = rest.split_once(' ').unwrap_or((rest, ""));
                self.edit(PageEdit::Append {
                    parent: parent.to_string(),
                    html: html.to_string(),
                })
                .await;
            }
            "/remove" => {
                self.edit(PageEdit::Remove {
                    target: rest.to_string(),
                })
                .await;
            }
            _ if line.starts_with('/') => eprintln!("unknown command: {command}"),
            _ => self.ask(line).await,
        }
        true
    }

    async fn ask(&mut self, text: &str) {
        if self.popup.is_listening() {
            // Typed lines stand in for what the microphone heard.
            let heard = self
                .link
                .recognition(RecognitionEvent::Transcript(text.to_string()))
                .and_then(|()| self.link.recognition(RecognitionEvent::Ended));
            if let Err(e) = heard {
                eprintln!("error: {e}");
            }
            return;
        }

        self.popup
            .handle_notification(Notification::NewUserMessage {
                message: text.to_string(),
            });
        match self
            .handle
            .request(Request::ProcessQuery {
                query: text.to_string(),
            })
            .await
        {
            Ok(Response::Answer { .. }) => {}
            Ok(Response::Failure { error }) => eprintln!("error: {error}"),
            Ok(other) => tracing::debug!(?other, "Unexpected query reply"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    async fn edit(&self, edit: PageEdit) {
        if let Err(e) = self.handle.edit(edit).await {
            eprintln!("error: {e}");
        }
    }

    async fn print_info(&self) {
        match self.handle.request(Request::GetPageInfo).await {
            Ok(info @ Response::PageInfo { .. }) => match serde_json::to_string_pretty(&info) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("error: {e}"),
            },
            Ok(other) => tracing::debug!(?other, "Unexpected page info reply"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    fn flush_conversation(&mut self) {
        let entries = self.popup.conversation().entries();
        for entry in &entries[self.printed.min(entries.len())..] {
            match entry.role {
                Role::User => println!("you: {}", entry.text),
                Role::Assistant => println!("assistant: {}", entry.text),
                Role::System => println!("-- {}", entry.text),
            }
        }
        self.printed = entries.len();
    }
}

fn report<E: Display>(result: Result<(), E>) {
    match result {
        Ok(()) => println!("saved"),
        Err(e) => eprintln!("error: {e}"),
    }
}
