//! Prompt assembly for grounded answers.

use super::llm::{Message, Role};
use crate::retrieve::RetrievalHit;

/// Instructions sent ahead of every RAG turn.
pub const SYSTEM_PROMPT: &str = "You are PortOps, an assistant for port operations.
Answer using the retrieved SOP context below. If the context doesn\u{2019}t contain the answer, say what\u{2019}s missing.
Respond with:
**Summary**
**Steps**
**Exceptions/Notes**
Cite sources in parentheses like (source: <filename>).";

/// First assistant message of every session.
pub const WELCOME_MESSAGE: &str = "Welcome! Port Ops is here to help you with all your Queries.";

/// Numbered context blocks, one per hit, separated by blank lines.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[CTX {}] {}\n(source: {})", i + 1, hit.text, hit.source()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The user turn carrying retrieved context.
pub fn grounded_question(question: &str, hits: &[RetrievalHit]) -> String {
    format!(
        "{question}\n\n---\nRETRIEVED SOP CONTEXT:\n{}",
        format_context(hits)
    )
}

/// Messages for one completion call.
///
/// `history` must already end with the current user question.
/// - RAG on, hits present: system prompt, prior history, grounded question.
/// - RAG on, no hits: system prompt, full history.
/// - RAG off: full history only.
pub fn build_messages(history: &[Message], use_rag: bool, hits: &[RetrievalHit]) -> Vec<Message> {
    if !use_rag {
        return history.to_vec();
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(SYSTEM_PROMPT));

    match history.split_last() {
        Some((last, prior)) if !hits.is_empty() && last.role == Role::User => {
            messages.extend_from_slice(prior);
            messages.push(Message::user(grounded_question(&last.content, hits)));
        }
        _ => messages.extend_from_slice(history),
    }

    messages
}
