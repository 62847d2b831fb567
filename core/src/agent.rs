//! Page-context event loop.
//!
//! ```text
//! PageHandle ──AgentEvent──► PageAgent ──► Session (sync)
//!                                │  ▲
//!                 tokio::spawn   │  │ Completion
//!                                ▼  │
//!                         RemoteClient
//! ```
//!
//! One task owns the [`Session`]. Requests, recognition events, speech-end
//! events and page edits arrive on a single inbox and are handled in order.
//! Remote calls run on spawned tasks so the loop keeps serving the inbox and
//! its timers while a request is in flight; their results come back as
//! completions. A query whose speech was stopped in the meantime is still
//! spoken when its answer arrives.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;
use voxpage_providers::{RemoteClient, RemoteError};
use voxpage_types::ApiKey;

use crate::protocol::{ChannelError, Request, Response};
use crate::session::{Outcome, PageEdit, QueryStep, RemoteJob, Session};
use crate::speech::RecognitionEvent;

const INBOX_CAPACITY: usize = 64;
const COMPLETION_CAPACITY: usize = 16;

#[derive(Debug)]
pub enum AgentEvent {
    Request {
        request: Request,
        /// `None` for fire-and-forget requests.
        reply: Option<oneshot::Sender<Response>>,
    },
    Recognition(RecognitionEvent),
    SpeechFinished,
    Edit(PageEdit),
}

#[derive(Debug)]
enum Completion {
    Query {
        reply: Option<oneshot::Sender<Response>>,
        result: Result<String, RemoteError>,
    },
    KeyCheck {
        reply: Option<oneshot::Sender<Response>>,
        result: Result<(), RemoteError>,
    },
}

/// Sending side of a page agent's inbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PageHandle {
    url: String,
    tx: mpsc::Sender<AgentEvent>,
}

impl PageHandle {
    /// Create the inbox for a page at `url`. The receiver goes to
    /// [`PageAgent::new`]; handles can be given to host devices before the
    /// agent exists.
    #[must_use]
    pub fn channel(url: impl Into<String>) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        (
            Self {
                url: url.into(),
                tx,
            },
            rx,
        )
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, request: Request) -> Result<Response, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(AgentEvent::Request {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| ChannelError::Disconnected)?;
        response.await.map_err(|_| ChannelError::NoResponse)
    }

    /// Send a request without waiting for a reply.
    pub async fn send(&self, request: Request) -> Result<(), ChannelError> {
        self.tx
            .send(AgentEvent::Request {
                request,
                reply: None,
            })
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    pub async fn edit(&self, edit: PageEdit) -> Result<(), ChannelError> {
        self.tx
            .send(AgentEvent::Edit(edit))
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Link for host devices. It does not keep the agent alive.
    #[must_use]
    pub fn host_link(&self) -> HostLink {
        HostLink {
            tx: self.tx.downgrade(),
        }
    }
}

/// Weak, non-blocking sender used by host devices to report back from inside
/// agent callbacks.
#[derive(Debug, Clone)]
pub struct HostLink {
    tx: mpsc::WeakSender<AgentEvent>,
}

impl HostLink {
    pub fn recognition(&self, event: RecognitionEvent) -> Result<(), ChannelError> {
        self.deliver(AgentEvent::Recognition(event))
    }

    pub fn speech_finished(&self) -> Result<(), ChannelError> {
        self.deliver(AgentEvent::SpeechFinished)
    }

    fn deliver(&self, event: AgentEvent) -> Result<(), ChannelError> {
        let tx = self.tx.upgrade().ok_or(ChannelError::Disconnected)?;
        tx.try_send(event).map_err(|_| ChannelError::Disconnected)
    }
}

pub struct PageAgent {
    session: Session,
    client: RemoteClient,
    inbox: mpsc::Receiver<AgentEvent>,
    done_tx: mpsc::Sender<Completion>,
    done_rx: mpsc::Receiver<Completion>,
    /// Spawned remote calls whose completion has not been handled yet.
    in_flight: usize,
}

impl PageAgent {
    #[must_use]
    pub fn new(session: Session, client: RemoteClient, inbox: mpsc::Receiver<AgentEvent>) -> Self {
        let (done_tx, done_rx) = mpsc::channel(COMPLETION_CAPACITY);
        Self {
            session,
            client,
            inbox,
            done_tx,
            done_rx,
            in_flight: 0,
        }
    }

    /// Run until every [`PageHandle`] is dropped and every remote call already
    /// in flight has been answered. Returns the session so the caller can
    /// inspect its final state.
    pub async fn run(mut self) -> Session {
        self.session.announce_ready();

        let mut accepting = true;
        while accepting || self.in_flight > 0 {
            let deadline = self.session.next_deadline();
            tokio::select! {
                event = self.inbox.recv(), if accepting => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        tracing::debug!(in_flight = self.in_flight, "Inbox closed");
                        accepting = false;
                    }
                },
                Some(done) = self.done_rx.recv() => self.complete(done),
                () = sleep_until(deadline) => self.session.on_timer(now()),
            }
        }

        tracing::info!("Page agent stopped");
        self.session
    }

    fn dispatch(&mut self, event: AgentEvent) {
        let now = now();
        match event {
            AgentEvent::Request { request, reply } => {
                tracing::debug!(action = request.action(), "Request received");
                match self.session.handle(request, now) {
                    Outcome::Reply(response) => respond(reply, response),
                    Outcome::Remote(job) => self.spawn_query(job, reply),
                    Outcome::KeyCheck(api_key) => self.spawn_key_check(api_key, reply),
                }
            }
            AgentEvent::Recognition(event) => {
                if let Some(QueryStep::Remote(job)) = self.session.on_recognition(event, now) {
                    self.spawn_query(job, None);
                }
            }
            AgentEvent::SpeechFinished => self.session.on_speech_finished(),
            AgentEvent::Edit(edit) => {
                if let Err(e) = self.session.apply_edit(edit, now) {
                    tracing::warn!("Page edit failed: {e}");
                }
            }
        }
    }

    fn complete(&mut self, done: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match done {
            Completion::Query { reply, result } => {
                let response = self.session.finish_query(result);
                respond(reply, Response::Answer { response });
            }
            Completion::KeyCheck { reply, result } => {
                let success = self.session.finish_test_api(result);
                respond(reply, Response::TestResult { success });
            }
        }
    }

    fn spawn_query(&mut self, job: RemoteJob, reply: Option<oneshot::Sender<Response>>) {
        self.in_flight += 1;
        let client = self.client.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = job.run(&client).await;
            if done.send(Completion::Query { reply, result }).await.is_err() {
                tracing::debug!("Page agent gone before remote answer arrived");
            }
        });
    }

    fn spawn_key_check(&mut self, api_key: ApiKey, reply: Option<oneshot::Sender<Response>>) {
        self.in_flight += 1;
        let client = self.client.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let result = client.key_check(&api_key).await;
            if done.send(Completion::KeyCheck { reply, result }).await.is_err() {
                tracing::debug!("Page agent gone before the key check finished");
            }
        });
    }
}

fn respond(reply: Option<oneshot::Sender<Response>>, response: Response) {
    if let Some(reply) = reply
        && reply.send(response).is_err()
    {
        tracing::debug!("Requester went away before the reply");
    }
}

fn now() -> Instant {
    TokioInstant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(TokioInstant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
