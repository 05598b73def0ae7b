use async_trait::async_trait;
use chrono::{ Duration, Utc };
use log::{ debug, info };
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ Session, SessionStore };
use crate::models::chat::ConversationTurn;
use crate::settings::{ SessionSettings, SettingCommand };

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Option<Duration>,
    max_turns: usize,
}

impl InMemorySessionStore {
    /// A `ttl_secs` of 0 keeps sessions until they are ended explicitly.
    pub fn new(ttl_secs: u64, max_turns: usize) -> Self {
        let ttl = match ttl_secs {
            0 => None,
            secs => Some(Duration::seconds(secs.min(i32::MAX as u64) as i64)),
        };
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_turns: max_turns.max(1),
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        match self.ttl {
            Some(ttl) => session.last_active + ttl < Utc::now(),
            None => false,
        }
    }

    async fn purge_expired(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s));
        let purged = before - sessions.len();
        if purged > 0 {
            info!("Purged {} idle sessions", purged);
        }
    }

    async fn touch<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        let expired = sessions.get(id).map(|s| self.is_expired(s))?;
        if expired {
            debug!("Session {} expired", id);
            sessions.remove(id);
            return None;
        }
        let session = sessions.get_mut(id)?;
        session.last_active = Utc::now();
        Some(f(session))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Session {
        self.purge_expired().await;
        let session = Session::new(Uuid::new_v4().to_string());
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        info!("Started session {}", session.id);
        session
    }

    async fn get(&self, id: &str) -> Option<Session> {
        self.purge_expired().await;
        self.sessions.read().await.get(id).cloned()
    }

    async fn append_turns(&self, id: &str, turns: Vec<ConversationTurn>) -> bool {
        let max_turns = self.max_turns;
        self.touch(id, |session| {
            session.turns.extend(turns);
            if session.turns.len() > max_turns {
                let excess = session.turns.len() - max_turns;
                session.turns.drain(..excess);
            }
        }).await.is_some()
    }

    async fn update_settings(
        &self,
        id: &str,
        commands: &[SettingCommand]
    ) -> Option<SessionSettings> {
        self.touch(id, |session| {
            session.settings.apply_all(commands);
            session.settings.clone()
        }).await
    }

    async fn remember_instructions(&self, id: &str, model: &str, text: &str) -> bool {
        self.touch(id, |session| {
            session.instructions.insert(model.to_string(), text.to_string());
        }).await.is_some()
    }

    async fn end(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Ended session {}", id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn { role, content: content.to_string() }
    }

    #[tokio::test]
    async fn lifecycle_create_mutate_end() {
        let store = InMemorySessionStore::new(3600, 10);
        let session = store.create().await;

        assert!(store.append_turns(&session.id, vec![turn(Role::User, "hi")]).await);
        let settings = store
            .update_settings(&session.id, &[SettingCommand::Tone("sweet".into())]).await
            .unwrap();
        assert_eq!(settings.tone.as_deref(), Some("sweet"));
        assert!(store.remember_instructions(&session.id, "Mia", "never say babe").await);

        let stored = store.get(&session.id).await.unwrap();
        assert_eq!(stored.turns.len(), 1);
        assert_eq!(stored.instructions.get("Mia").map(String::as_str), Some("never say babe"));

        assert!(store.end(&session.id).await);
        assert!(store.get(&session.id).await.is_none());
        assert!(!store.end(&session.id).await);
    }

    #[tokio::test]
    async fn history_is_capped_to_most_recent_turns() {
        let store = InMemorySessionStore::new(3600, 3);
        let session = store.create().await;
        let turns = (0..5).map(|i| turn(Role::User, &i.to_string())).collect();
        store.append_turns(&session.id, turns).await;

        let stored = store.get(&session.id).await.unwrap();
        let contents: Vec<&str> = stored.turns
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let store = InMemorySessionStore::new(3600, 10);
        assert!(!store.append_turns("nope", Vec::new()).await);
        assert!(store.update_settings("nope", &[]).await.is_none());
        assert!(!store.remember_instructions("nope", "m", "t").await);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = InMemorySessionStore::new(1, 10);
        let session = store.create().await;
        {
            let mut sessions = store.sessions.write().await;
            let s = sessions.get_mut(&session.id).unwrap();
            s.last_active = Utc::now() - Duration::seconds(5);
        }
        assert!(store.get(&session.id).await.is_none());
    }
}
