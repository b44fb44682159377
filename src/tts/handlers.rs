use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{instrument, warn};

use super::TtsError;
use crate::{
    auth::jwt::AuthUser,
    error::{AppError, Result},
    state::AppState,
};

pub fn tts_routes() -> Router<AppState> {
    Router::new().route("/tts", post(convert))
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default)]
    pub language: String,
}

/// Streams synthesized speech for `text` as `audio/mpeg`.
#[instrument(skip(state, payload))]
pub async fn convert(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(payload): Json<TtsRequest>,
) -> Result<Response> {
    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest("text is required".into()));
    }

    let audio = state
        .speech
        .synthesize(&payload.text, &payload.language)
        .await
        .map_err(|e| {
            warn!(error = %e, language = %payload.language, "speech synthesis failed");
            let message = match e {
                TtsError::Transport(_) => "TTS service error",
                TtsError::Status { .. } => "TTS service unavailable",
            };
            AppError::UpstreamUnavailable(message.into())
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], Body::from_stream(audio)).into_response())
}
