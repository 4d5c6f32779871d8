//! The conversational-response collaborator.
//!
//! The assistant contact answers direct messages. The contract is the
//! minimal surface the client needs: one prompt plus prior turns in, one
//! reply out. On error the caller substitutes [`FALLBACK_REPLY`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Assistant service error: {0}")]
    Service(String),
}

/// Reply used when the responder fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble thinking right now. Could you repeat that?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantRole {
    User,
    Model,
}

#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub role: AssistantRole,
    pub text: String,
}

#[async_trait]
pub trait AssistantResponder: Send + Sync {
    async fn respond(
        &self,
        prompt: &str,
        history: &[AssistantTurn],
    ) -> Result<String, AssistantError>;
}

/// Deterministic local responder used when no hosted service is wired in.
pub struct CannedResponder;

#[async_trait]
impl AssistantResponder for CannedResponder {
    async fn respond(
        &self,
        prompt: &str,
        history: &[AssistantTurn],
    ) -> Result<String, AssistantError> {
        let trimmed = prompt.trim();
        let lower = trimmed.to_lowercase();

        let reply = if trimmed.is_empty() {
            "I didn't catch that, could you type it again?".to_string()
        } else if lower.starts_with("hello") || lower.starts_with("hi") || lower.starts_with("hey")
        {
            "Hey! 👋 What can I do for you?".to_string()
        } else if lower.ends_with('?') {
            format!("Good question! My take on \"{trimmed}\": start simple and iterate.")
        } else if history.is_empty() {
            format!("Got it: \"{trimmed}\". Tell me more and I'll help where I can.")
        } else {
            format!("Noted: \"{trimmed}\". Anything else?")
        };

        Ok(reply)
    }
}
