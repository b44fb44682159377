use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::model::{Message, Role};

const MAX_CONTEXT_MESSAGES: usize = 20;

type ContextKey = (Uuid, String, u8);

/// Tail of a user's latest session per (language, level), replayed into the
/// next session for continuity.
#[derive(Default)]
pub struct ContextStore {
    contexts: RwLock<HashMap<ContextKey, Vec<Message>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: Uuid, language: &str, level: u8) -> Vec<Message> {
        self.contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(user_id, language.to_string(), level))
            .cloned()
            .unwrap_or_default()
    }

    /// Keeps the last non-system messages of `transcript`.
    pub fn save(&self, user_id: Uuid, language: &str, level: u8, transcript: &[Message]) {
        let visible: Vec<Message> = transcript
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        let start = visible.len().saturating_sub(MAX_CONTEXT_MESSAGES);
        let tail = visible[start..].to_vec();

        self.contexts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((user_id, language.to_string(), level), tail);
    }
}
