//! Chat-completion client used by the conversation relay.

mod openai;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::sessions::Message;

pub use openai::OpenAiClient;

/// Visible text deltas of one streamed completion, in order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat endpoint unreachable: {0}")]
    Transport(String),

    #[error("chat endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed chat response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Text safe to show to the end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            LlmError::Transport(_) => "AI service unavailable",
            LlmError::Status { .. } | LlmError::Malformed(_) => "AI service error",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts a streaming completion. Errors before the first byte are
    /// returned directly; later failures arrive through the stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, LlmError>;

    /// Single-shot completion returning the assistant text.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}
