//! Streams one conversation turn from the chat model back to the caller.
//!
//! The relay holds no store lock while the upstream call is in flight. It
//! writes to the session only once the stream has completed, so a caller
//! that disconnects mid-reply (dropping the stream) leaves no partial
//! assistant message behind.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::prompts::build_greet_prompt;
use crate::error::AppError;
use crate::llm::{ChatClient, ChatRequest};
use crate::sessions::{ContextStore, Message, Session, SessionStore};

pub const TEMPERATURE: f32 = 0.75;
/// Leaves room for reasoning models that think before emitting content.
pub const MAX_TOKENS: u32 = 4096;

/// One server-sent event of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Error(String),
    Done,
}

impl RelayEvent {
    pub fn payload(&self) -> serde_json::Value {
        match self {
            RelayEvent::Content(text) => json!({ "content": text }),
            RelayEvent::Error(message) => json!({ "error": message }),
            RelayEvent::Done => json!({ "done": true }),
        }
    }
}

/// A validated turn: the session it belongs to and the outbound transcript.
#[derive(Debug)]
pub struct Turn {
    pub session: Session,
    pub outbound: Vec<Message>,
}

/// Checks ownership and builds the outbound message list. A regular message
/// is persisted before the model is called; the greet trigger never is.
pub fn prepare_turn(
    sessions: &SessionStore,
    user_id: Uuid,
    session_id: Uuid,
    message: &str,
    greet: bool,
) -> Result<Turn, AppError> {
    let session = sessions.get(session_id)?;
    if session.user_id != user_id {
        warn!(%session_id, %user_id, "session owned by another user");
        return Err(AppError::Forbidden("forbidden".into()));
    }

    let mut outbound = session.messages.clone();
    if greet {
        outbound.push(Message::user(build_greet_prompt(&session.language, session.level)));
    } else {
        if message.trim().is_empty() {
            return Err(AppError::BadRequest("message cannot be empty".into()));
        }
        let user_message = Message::user(message);
        sessions.add_message(session_id, user_message.clone())?;
        outbound.push(user_message);
    }

    Ok(Turn { session, outbound })
}

/// Runs the upstream completion for `turn` and yields caller events. Ends
/// with `Done` on success or a single `Error` on any upstream failure.
pub fn relay(
    chat: Arc<dyn ChatClient>,
    sessions: Arc<SessionStore>,
    contexts: Arc<ContextStore>,
    turn: Turn,
) -> impl Stream<Item = RelayEvent> + Send + 'static {
    async_stream::stream! {
        let Turn { session, outbound } = turn;
        let request = ChatRequest {
            messages: outbound,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let mut deltas = match chat.stream_chat(request).await {
            Ok(deltas) => deltas,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "chat request failed");
                yield RelayEvent::Error(e.public_message().to_string());
                return;
            }
        };

        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    reply.push_str(&text);
                    yield RelayEvent::Content(text);
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "chat stream failed");
                    yield RelayEvent::Error(e.public_message().to_string());
                    return;
                }
            }
        }

        if reply.is_empty() {
            warn!(
                session_id = %session.id,
                level = session.level,
                language = %session.language,
                "model produced no visible text"
            );
        } else {
            match sessions.add_message(session.id, Message::assistant(reply)) {
                Ok(()) => {
                    if let Ok(updated) = sessions.get(session.id) {
                        contexts.save(session.user_id, &session.language, session.level, &updated.messages);
                    }
                    info!(session_id = %session.id, "assistant reply stored");
                }
                Err(e) => debug!(session_id = %session.id, error = %e, "session vanished before reply"),
            }
        }

        yield RelayEvent::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::Role;
    use crate::testing::FakeChat;

    fn setup(chat: FakeChat) -> (Arc<FakeChat>, Arc<SessionStore>, Arc<ContextStore>, Session) {
        let sessions = Arc::new(SessionStore::new());
        let session = sessions.create(Uuid::new_v4(), "fr", "general", 3, "S");
        (Arc::new(chat), sessions, Arc::new(ContextStore::new()), session)
    }

    async fn run(
        chat: &Arc<FakeChat>,
        sessions: &Arc<SessionStore>,
        contexts: &Arc<ContextStore>,
        turn: Turn,
    ) -> Vec<RelayEvent> {
        relay(chat.clone(), sessions.clone(), contexts.clone(), turn)
            .collect()
            .await
    }

    #[tokio::test]
    async fn streams_deltas_then_stores_reply() {
        let (chat, sessions, contexts, session) = setup(FakeChat::replying(&["Bon", "jour"]));
        let turn = prepare_turn(&sessions, session.user_id, session.id, "salut", false).unwrap();

        let events = run(&chat, &sessions, &contexts, turn).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Content("Bon".into()),
                RelayEvent::Content("jour".into()),
                RelayEvent::Done,
            ]
        );

        let messages = sessions.get_messages(session.id).unwrap();
        assert_eq!(messages, vec![Message::user("salut"), Message::assistant("Bonjour")]);

        let request = chat.last_request().unwrap();
        assert_eq!(request.temperature, TEMPERATURE);
        assert_eq!(request.max_tokens, MAX_TOKENS);
        assert_eq!(request.messages[0], Message::system("S"));
        assert_eq!(request.messages.last(), Some(&Message::user("salut")));

        let context = contexts.get(session.user_id, "fr", 3);
        assert_eq!(context.len(), 2);
    }

    #[tokio::test]
    async fn greet_is_sent_but_not_stored() {
        let (chat, sessions, contexts, session) = setup(FakeChat::replying(&["Salut !"]));
        let turn = prepare_turn(&sessions, session.user_id, session.id, "", true).unwrap();
        run(&chat, &sessions, &contexts, turn).await;

        let sent = chat.last_request().unwrap().messages;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].role, Role::User);
        assert!(sent[1].content.contains("French"));
        assert_eq!(
            sessions.get_messages(session.id).unwrap(),
            vec![Message::assistant("Salut !")]
        );
    }

    #[tokio::test]
    async fn upstream_refusal_is_one_error_event() {
        let (chat, sessions, contexts, session) = setup(FakeChat {
            unavailable: true,
            ..Default::default()
        });
        let turn = prepare_turn(&sessions, session.user_id, session.id, "hi", false).unwrap();

        let events = run(&chat, &sessions, &contexts, turn).await;
        assert_eq!(events, vec![RelayEvent::Error("AI service unavailable".into())]);
        // The user message was stored before the call; nothing else was.
        assert_eq!(sessions.get_messages(session.id).unwrap(), vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn mid_stream_failure_drops_partial_reply() {
        let (chat, sessions, contexts, session) = setup(FakeChat {
            deltas: vec!["Bon".into()],
            fail_mid_stream: true,
            ..Default::default()
        });
        let turn = prepare_turn(&sessions, session.user_id, session.id, "hi", false).unwrap();

        let events = run(&chat, &sessions, &contexts, turn).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Content("Bon".into()),
                RelayEvent::Error("AI service error".into()),
            ]
        );
        assert_eq!(sessions.get_messages(session.id).unwrap().len(), 1);
        assert!(contexts.get(session.user_id, "fr", 3).is_empty());
    }

    #[tokio::test]
    async fn empty_reply_still_completes() {
        let (chat, sessions, contexts, session) = setup(FakeChat::default());
        let turn = prepare_turn(&sessions, session.user_id, session.id, "hi", false).unwrap();
        let events = run(&chat, &sessions, &contexts, turn).await;
        assert_eq!(events, vec![RelayEvent::Done]);
        assert_eq!(sessions.get_messages(session.id).unwrap().len(), 1);
    }

    #[test]
    fn prepare_rejects_bad_turns() {
        let sessions = SessionStore::new();
        let owner = Uuid::new_v4();
        let session = sessions.create(owner, "it", "general", 3, "S");

        assert!(matches!(
            prepare_turn(&sessions, owner, Uuid::new_v4(), "hi", false),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            prepare_turn(&sessions, Uuid::new_v4(), session.id, "hi", false),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            prepare_turn(&sessions, owner, session.id, "   ", false),
            Err(AppError::BadRequest(_))
        ));
        assert!(sessions.get_messages(session.id).unwrap().is_empty());
    }

    #[test]
    fn event_payloads() {
        assert_eq!(RelayEvent::Content("a".into()).payload(), json!({ "content": "a" }));
        assert_eq!(RelayEvent::Error("x".into()).payload(), json!({ "error": "x" }));
        assert_eq!(RelayEvent::Done.payload(), json!({ "done": true }));
    }
}
