//! Tutoring conversations: catalog, prompts and the streaming relay.

pub mod catalog;
pub mod handlers;
pub mod prompts;
pub mod relay;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::conversation_routes()
}
