mod elevenlabs;
pub mod handlers;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

pub use elevenlabs::ElevenLabsClient;

pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, TtsError>> + Send>>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("speech endpoint unreachable: {0}")]
    Transport(String),

    #[error("speech endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Text-to-speech provider returning an audio/mpeg byte stream.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioStream, TtsError>;
}
