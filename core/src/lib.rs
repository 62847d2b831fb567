//! Core logic for voxpage.
//!
//! - [`classifier`] and [`responder`]: route an utterance and answer simple
//!   questions locally.
//! - [`session`] and [`agent`]: the page-side state machine and the task
//!   that drives it.
//! - [`popup`]: the popup-side view of a page, reached through a
//!   [`PageChannel`].
//! - [`shortcuts`]: keyboard bindings and named commands.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod classifier;
pub mod popup;
pub mod protocol;
pub mod responder;
pub mod session;
pub mod shortcuts;
pub mod speech;

#[cfg(test)]
mod testing;

pub use agent::{AgentEvent, HostLink, PageAgent, PageHandle};
pub use classifier::{Classifier, Route, is_navigation};
pub use popup::{Connection, PageChannel, PopupState, RetryPolicy, is_restricted_url};
pub use protocol::{Ack, ChannelError, Request, Response};
pub use responder::Responder;
pub use session::{Host, Notifier, PageEdit, Session, SessionConfig};
pub use shortcuts::{Command, KeyChord, run_command};
pub use speech::{RecognitionEvent, SpeechOutput, SpeechRecognizer, Utterance};
