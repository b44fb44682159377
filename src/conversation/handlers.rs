use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    catalog::{self, find_language, find_topic, topic_details},
    prompts::{build_system_prompt, build_translate_prompt, normalize_level},
    relay::{self, prepare_turn},
};
use crate::{
    auth::jwt::AuthUser,
    error::{AppError, Result},
    llm::ChatRequest,
    sessions::Message,
    state::AppState,
};

const TRANSLATE_TEMPERATURE: f32 = 0.1;
const TRANSLATE_MAX_TOKENS: u32 = 512;

pub fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route("/languages", get(catalog::get_languages))
        .route("/topics", get(catalog::get_topics))
        .route("/conversation/start", post(start))
        .route("/conversation/message", post(message))
        .route("/conversation/history/:session_id", get(history))
        .route("/conversation/translate", post(translate))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub language: String,
    pub topic: String,
    #[serde(default)]
    pub level: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub language: String,
    pub topic: String,
    pub topic_name: String,
    pub level: u8,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
    /// Opening trigger: the tutor greets first and nothing is stored.
    #[serde(default)]
    pub greet: bool,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub language: String,
}

fn parse_session_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|_| AppError::NotFound("session not found".into()))
}

#[instrument(skip(state, payload))]
pub async fn start(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<StartRequest>,
) -> Result<Response> {
    if find_language(&payload.language).is_none() {
        return Err(AppError::BadRequest("invalid language".into()));
    }
    let topic = find_topic(&payload.topic)
        .ok_or_else(|| AppError::BadRequest("invalid topic".into()))?;
    let level = normalize_level(payload.level);

    let user = state
        .users
        .get_by_id(user_id)
        .map_err(|_| AppError::Unauthorized("user not found".into()))?;
    if !user.has_conversation_access() {
        warn!(%user_id, status = user.subscription_status.as_str(), "conversation without access");
        let body = serde_json::json!({
            "error": "Your subscription has ended. Please visit your profile to resubscribe.",
            "code": "subscription_ended",
        });
        return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
    }
    if !user.can_use_level(level) {
        return Err(AppError::Forbidden(
            "Levels 4 and 5 require a full subscription. Upgrade to unlock advanced practice."
                .into(),
        ));
    }

    let prior = state.contexts.get(user_id, &payload.language, level);
    let system_prompt = build_system_prompt(
        &payload.language,
        level,
        topic.name,
        topic.description,
        !prior.is_empty(),
    );
    let session = state
        .sessions
        .create(user_id, &payload.language, topic.id, level, &system_prompt);
    for message in prior {
        state.sessions.add_message(session.id, message)?;
    }
    info!(session_id = %session.id, %user_id, level, "conversation started");

    let body = StartResponse {
        session_id: session.id,
        language: session.language,
        topic: session.topic,
        topic_name: topic.name.to_string(),
        level,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[instrument(skip(state, payload))]
pub async fn message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<MessageRequest>,
) -> Result<Response> {
    let session_id = parse_session_id(&payload.session_id)?;
    let turn = prepare_turn(
        &state.sessions,
        user_id,
        session_id,
        &payload.message,
        payload.greet,
    )?;

    let events = relay::relay(
        state.chat.clone(),
        state.sessions.clone(),
        state.contexts.clone(),
        turn,
    )
    .map(|event| Ok::<_, Infallible>(Event::default().data(event.payload().to_string())));

    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(events),
    )
        .into_response())
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session_id = parse_session_id(&session_id)?;
    let session = state.sessions.get(session_id)?;
    if session.user_id != user_id {
        return Err(AppError::Forbidden("forbidden".into()));
    }

    let messages = state.sessions.get_messages(session_id)?;
    let (topic_name, _) = topic_details(&session.topic);
    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "language": session.language,
        "topic": session.topic,
        "topic_name": topic_name,
        "level": session.level,
        "messages": messages,
    })))
}

#[instrument(skip(state, payload))]
pub async fn translate(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<serde_json::Value>> {
    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest("text cannot be empty".into()));
    }

    let request = ChatRequest {
        messages: vec![Message::user(build_translate_prompt(
            &payload.language,
            &payload.text,
        ))],
        temperature: TRANSLATE_TEMPERATURE,
        max_tokens: TRANSLATE_MAX_TOKENS,
    };
    let translation = state.chat.complete(request).await.map_err(|e| {
        warn!(error = %e, "translation failed");
        AppError::UpstreamUnavailable(e.public_message().into())
    })?;

    Ok(Json(serde_json::json!({ "translation": translation.trim() })))
}
