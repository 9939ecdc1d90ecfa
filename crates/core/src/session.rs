//! Ephemeral per-channel session state.
//!
//! A session holds what a chat channel knows between turns that is NOT part
//! of durable conversation history: the user's last known coordinates, the
//! most recent rendered weather report, and whether a forecast was asked
//! for before a location was known. Sessions live only in memory — they are
//! cleared by an explicit user action or a process restart, never persisted.
//!
//! Concurrency discipline: a single async `RwLock` over the map, with all
//! mutation funneled through a closure held under the write lock. Sessions
//! are best-effort state; readers get a clone and may observe a value one
//! write stale.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Ephemeral state for one chat channel (a Telegram chat, a web
/// conversation, a CLI session).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Last known coordinates (latitude, longitude).
    pub location: Option<(f64, f64)>,

    /// Most recent rendered weather/forecast report.
    pub weather_report: Option<String>,

    /// Set when the user asked for a forecast before sharing a location.
    pub forecast_requested: bool,
}

/// Keyed in-memory session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session for `key`, if one exists.
    pub async fn get(&self, key: &str) -> Option<Session> {
        self.sessions.read().await.get(key).cloned()
    }

    /// The stored weather report for `key`, if any.
    pub async fn weather_report(&self, key: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(key)
            .and_then(|s| s.weather_report.clone())
    }

    /// Mutate (creating if absent) the session for `key` under the write
    /// lock.
    pub async fn update<F>(&self, key: &str, mutate: F)
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        mutate(sessions.entry(key.to_string()).or_default());
    }

    /// Drop the session for `key`. Returns whether one existed.
    pub async fn clear(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_session_is_none() {
        let store = SessionStore::new();
        assert!(store.get("chat1").await.is_none());
        assert!(store.weather_report("chat1").await.is_none());
    }

    #[tokio::test]
    async fn update_creates_and_mutates() {
        let store = SessionStore::new();
        store
            .update("chat1", |s| {
                s.location = Some((6.5244, 3.3792));
                s.weather_report = Some("Current weather in Lagos: 29°C, clear sky.".into());
            })
            .await;

        let session = store.get("chat1").await.unwrap();
        assert_eq!(session.location, Some((6.5244, 3.3792)));
        assert_eq!(
            store.weather_report("chat1").await.as_deref(),
            Some("Current weather in Lagos: 29°C, clear sky.")
        );
    }

    #[tokio::test]
    async fn updates_compose() {
        let store = SessionStore::new();
        store.update("chat1", |s| s.forecast_requested = true).await;
        store
            .update("chat1", |s| s.location = Some((9.0765, 7.3986)))
            .await;

        let session = store.get("chat1").await.unwrap();
        assert!(session.forecast_requested);
        assert_eq!(session.location, Some((9.0765, 7.3986)));
    }

    #[tokio::test]
    async fn clear_removes_only_that_key() {
        let store = SessionStore::new();
        store.update("chat1", |s| s.forecast_requested = true).await;
        store.update("chat2", |s| s.forecast_requested = true).await;

        assert!(store.clear("chat1").await);
        assert!(!store.clear("chat1").await);
        assert!(store.get("chat2").await.is_some());
        assert_eq!(store.len().await, 1);
    }
}
