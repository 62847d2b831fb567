//! Mistral chat-completions wire types.

use serde::{Deserialize, Serialize};
use voxpage_types::ModelChoice;

use crate::{KEY_CHECK_PROMPT, MAX_PROMPT_EXCERPT_CHARS, PageExcerpt, SYSTEM_PROMPT, key_check_model};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// System instruction plus one user turn carrying the page and the question.
    #[must_use]
    pub fn page_question(model: ModelChoice, question: &str, page: &PageExcerpt) -> Self {
        Self {
            model: model.backend_model(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", user_content(question, page)),
            ],
        }
    }

    #[must_use]
    pub fn key_check() -> Self {
        Self {
            model: key_check_model().backend_model(),
            messages: vec![ChatMessage::new("user", KEY_CHECK_PROMPT)],
        }
    }
}

fn user_content(question: &str, page: &PageExcerpt) -> String {
    let excerpt = match page.excerpt.char_indices().nth(MAX_PROMPT_EXCERPT_CHARS) {
        Some((cut, _)) => &page.excerpt[..cut],
        None => page.excerpt.as_str(),
    };
    format!(
        "I'm on this webpage: \"{}\"\n\nMy question is: \"{question}\"\n\n\
         Here is relevant content from the page:\n{excerpt}",
        page.title
    )
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// `choices[0].message.content`, if present.
    #[must_use]
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}

/// `error.message`, else top-level `message`, from a JSON error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.get("message"))
        .or_else(|| value.get("message"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
