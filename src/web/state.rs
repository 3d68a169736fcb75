use crate::config::AppConfig;
use chrono::{DateTime, Utc};
use crate::pipeline::session::Session;
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
    // Live sessions; each owns its interaction log
    pub sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            sessions: RwLock::new(HashMap::new()),
            startup_time: chrono::Utc::now(),
        }
    }

    pub async fn open_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        info!("Opened session {}", session.id());
        session
    }

    /// Looks a session up and marks it as active.
    pub async fn session(&self, id: &Uuid) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned();
        if let Some(session) = &session {
            session.touch();
        }
        session
    }

    /// Drops the session and with it the interaction log.
    pub async fn close_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Closed session {}", id);
        }
        removed
    }

    /// Drops every session idle since before `now - max_idle`. Returns how
    /// many went.
    pub async fn reap_idle(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> usize {
        let cutoff = now - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.last_active() > cutoff);
        let reaped = before - sessions.len();
        if reaped > 0 {
            info!("Reaped {} idle session(s)", reaped);
        }
        reaped
    }
}
