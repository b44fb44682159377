use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, error};

use super::{AudioStream, SpeechClient, TtsError};
use crate::config::TtsConfig;

#[derive(Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    config: TtsConfig,
}

impl ElevenLabsClient {
    pub fn new(config: TtsConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl SpeechClient for ElevenLabsClient {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioStream, TtsError> {
        let voice = self.config.voice_for(language);
        let url = format!(
            "{}/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            voice
        );
        let body = SpeechBody {
            text,
            model_id: &self.config.model,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .http
            .post(url)
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "elevenlabs request failed");
                TtsError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "elevenlabs error");
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(voice, language, "speech stream started");
        let audio = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TtsError::Transport(e.to_string())));
        Ok(Box::pin(audio))
    }
}
