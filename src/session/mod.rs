mod memory;

pub use memory::InMemorySessionStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::sync::Arc;

use crate::cli::Args;
use crate::models::chat::ConversationTurn;
use crate::settings::{ SessionSettings, SettingCommand };

/// Server-held state for one chatter's tab session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
    pub settings: SessionSettings,
    /// Per-model instructions, keyed by model name.
    pub instructions: HashMap<String, String>,
}

impl Session {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active: now,
            turns: Vec::new(),
            settings: SessionSettings::default(),
            instructions: HashMap::new(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self) -> Session;

    async fn get(&self, id: &str) -> Option<Session>;

    /// Appends turns, keeping only the most recent ones. Returns `false` for unknown ids.
    async fn append_turns(&self, id: &str, turns: Vec<ConversationTurn>) -> bool;

    /// Runs each command through the settings reducer and returns the new settings.
    async fn update_settings(
        &self,
        id: &str,
        commands: &[SettingCommand]
    ) -> Option<SessionSettings>;

    async fn remember_instructions(&self, id: &str, model: &str, text: &str) -> bool;

    /// Discards the session. Returns `false` if it did not exist.
    async fn end(&self, id: &str) -> bool;
}

pub fn initialize_session_store(args: &Args) -> Arc<dyn SessionStore> {
    log::info!(
        "Sessions kept in memory (ttl={}s, max_history_turns={})",
        args.session_ttl_secs,
        args.max_history_turns
    );
    Arc::new(InMemorySessionStore::new(args.session_ttl_secs, args.max_history_turns))
}
