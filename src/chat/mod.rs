//! Grounded chat over the SOP index.
//!
//! - [`session`]: sign-in gate, history and the per-question turn
//! - [`prompt`]: system prompt and context assembly
//! - [`llm`]: the OpenAI-compatible completion client

pub mod llm;
pub mod prompt;
pub mod session;

pub use llm::{ChatError, ChatModel, Message, OpenAiCompatibleClient, Role};
pub use prompt::{SYSTEM_PROMPT, WELCOME_MESSAGE, build_messages, format_context};
pub use session::{Session, Turn, looks_like_email, mask_email, validate_gate};
