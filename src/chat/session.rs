//! Interactive session state: the sign-in gate, history and turns.

use super::llm::{ChatError, ChatModel, Message};
use super::prompt::{WELCOME_MESSAGE, build_messages};
use crate::retrieve::{RetrievalHit, Retriever};

pub const EMAIL_REQUIRED: &str = "Email is required.";
pub const EMAIL_INVALID: &str = "Please enter a valid email address (e.g., you@company.com).";
pub const API_KEY_REQUIRED: &str = "API key is required.";

/// Mask the local part of an email address: first and last character kept,
/// at least one star between them. Local parts of one or two characters
/// become all stars. Strings without `@` are returned unchanged.
pub fn mask_email(email: &str) -> String {
    let Some((user, domain)) = email.split_once('@') else {
        return email.to_string();
    };

    let chars: Vec<char> = user.chars().collect();
    let masked = match chars.as_slice() {
        [] => String::new(),
        [_] | [_, _] => "*".repeat(chars.len()),
        [first, .., last] => {
            let stars = "*".repeat((chars.len() - 2).max(1));
            format!("{first}{stars}{last}")
        }
    };

    format!("{masked}@{domain}")
}

/// Loose email check: an `@`, a `.` after the last `@`, no spaces.
pub fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    email.contains('@')
        && email
            .rsplit('@')
            .next()
            .is_some_and(|domain| domain.contains('.'))
        && !email.contains(' ')
}

/// Validate gate input, returning every problem found.
pub fn validate_gate(email: &str, api_key: &str) -> Result<(), Vec<&'static str>> {
    let mut errors = Vec::new();

    if email.trim().is_empty() {
        errors.push(EMAIL_REQUIRED);
    } else if !looks_like_email(email) {
        errors.push(EMAIL_INVALID);
    }

    if api_key.trim().is_empty() {
        errors.push(API_KEY_REQUIRED);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Result of one question.
#[derive(Debug)]
pub struct Turn {
    /// Snippets used to ground the answer (empty when RAG is off)
    pub hits: Vec<RetrievalHit>,
    /// The answer, or why the call failed
    pub answer: Result<String, ChatError>,
}

/// One interactive chat session.
#[derive(Debug, Clone)]
pub struct Session {
    messages: Vec<Message>,
    user_email: String,
    api_key: String,
    submitted: bool,
    use_rag: bool,
}

impl Session {
    pub fn new(use_rag: bool) -> Self {
        Self {
            messages: vec![Message::assistant(WELCOME_MESSAGE)],
            user_email: String::new(),
            api_key: String::new(),
            submitted: false,
            use_rag,
        }
    }

    /// Pass the gate. On error the session stays locked.
    pub fn submit(&mut self, email: &str, api_key: &str) -> Result<(), Vec<&'static str>> {
        validate_gate(email, api_key)?;
        self.user_email = email.trim().to_string();
        self.api_key = api_key.trim().to_string();
        self.submitted = true;
        tracing::info!(target: "chat", "session started for {}", self.masked_email());
        Ok(())
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn masked_email(&self) -> String {
        mask_email(&self.user_email)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn use_rag(&self) -> bool {
        self.use_rag
    }

    pub fn set_use_rag(&mut self, use_rag: bool) {
        self.use_rag = use_rag;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Drop the whole history, greeting included.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Ask a question: record it, retrieve context if enabled, call the
    /// model and record a non-empty answer.
    ///
    /// Retrieval errors are logged and treated as no context. A failed model
    /// call leaves the question in history without an answer.
    pub fn ask(
        &mut self,
        question: &str,
        retriever: Option<&Retriever<'_>>,
        model: &dyn ChatModel,
    ) -> Turn {
        self.messages.push(Message::user(question));

        let hits = match (self.use_rag, retriever) {
            (true, Some(retriever)) => match retriever.retrieve(question, None) {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(
                        target: "chat",
                        "retrieval failed, answering without context: {e}"
                    );
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let request = build_messages(&self.messages, self.use_rag, &hits);
        let answer = model.complete(&request);

        match &answer {
            Ok(text) if !text.is_empty() => self.messages.push(Message::assistant(text.clone())),
            Ok(_) => tracing::debug!(target: "chat", "empty answer not recorded"),
            Err(e) => tracing::warn!(target: "chat", "chat call failed: {e}"),
        }

        Turn { hits, answer }
    }
}
