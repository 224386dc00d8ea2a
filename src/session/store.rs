//! In-memory session store.
//!
//! Source of truth for session lifecycle state. Mutations are atomic per
//! session (DashMap shard locking); readers get a cloned snapshot.
//! Terminal records are retained for a bounded time and swept
//! opportunistically on insert, so memory does not grow with total
//! session count.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::{Session, SessionStatus};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("unknown session '{0}'")]
    NotFound(String),

    #[error("illegal session transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    retention: Duration,
}

impl SessionStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            retention,
        }
    }

    pub fn insert(&self, session: Session) {
        self.sweep();
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Advance a session along the lifecycle graph.
    ///
    /// Illegal transitions fail without mutating anything. Entering
    /// `Streaming` stamps `started_at`; entering a terminal state stamps
    /// `finished_at` and records the failure reason, if any.
    pub fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

        if !entry.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: entry.status,
                to: status,
            });
        }

        entry.status = status;
        let now = SystemTime::now();
        if status == SessionStatus::Streaming {
            entry.started_at = Some(now);
        }
        if status.is_terminal() {
            entry.finished_at = Some(now);
            entry.failure_reason = reason.map(str::to_owned);
        }
        debug!(session_id, status = status.as_str(), "session transition");
        Ok(())
    }

    /// Drop terminal sessions past the retention horizon.
    fn sweep(&self) {
        let retention = self.retention;
        self.sessions.retain(|_, session| {
            if !session.status.is_terminal() {
                return true;
            }
            match session.finished_at {
                Some(finished) => {
                    let age = SystemTime::now()
                        .duration_since(finished)
                        .unwrap_or_default();
                    age < retention
                }
                None => true,
            }
        });
    }
}
