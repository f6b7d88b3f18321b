//! HTTP session registry with idle expiry and a size cap.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use ica_core::config::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl SessionLimits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            idle_ttl: cfg.mcp_session_idle_ttl,
            max_sessions: cfg.mcp_max_sessions,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
            max_sessions: 1000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub created_at: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    limits: SessionLimits,
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            sessions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a fresh session. Expired sessions are swept first; when the
    /// store is still full the least recently used one is evicted.
    pub fn create(&mut self) -> String {
        self.create_at(Instant::now())
    }

    fn create_at(&mut self, now: Instant) -> String {
        let ttl = self.limits.idle_ttl;
        self.sessions
            .retain(|_, s| now.saturating_duration_since(s.last_seen) < ttl);

        while self.sessions.len() >= self.limits.max_sessions.max(1) {
            let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            tracing::info!(session = %oldest, "evicting least recently used mcp session");
            self.sessions.remove(&oldest);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            id.clone(),
            Session {
                created_at: now,
                last_seen: now,
            },
        );
        id
    }

    /// Mark `id` as used. Unknown and idle-expired sessions return false;
    /// an expired session is dropped.
    pub fn touch(&mut self, id: &str) -> bool {
        self.touch_at(id, Instant::now())
    }

    fn touch_at(&mut self, id: &str, now: Instant) -> bool {
        let ttl = self.limits.idle_ttl;
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if now.saturating_duration_since(session.last_seen) >= ttl {
            self.sessions.remove(id);
            return false;
        }
        session.last_seen = now;
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }
}
