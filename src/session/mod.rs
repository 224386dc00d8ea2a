//! Session domain model and lifecycle.

pub mod store;

use std::time::SystemTime;

use uuid::Uuid;

use crate::core::audio::AudioFormat;

pub use store::{SessionStore, StoreError};

/// Lifecycle state of a streaming session.
///
/// Transitions are monotonic: `Pending -> Streaming -> {Completed |
/// Failed | Cancelled}` or `Pending -> Cancelled`. Anything else is
/// rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Streaming)
                | (Pending, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// A single utterance's lifecycle from admission to terminal state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub provider_id: String,
    pub voice_id: String,
    pub language: Option<String>,
    pub text: String,
    pub target_format: AudioFormat,
    pub target_sample_rate_hz: u32,
    pub status: SessionStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub failure_reason: Option<String>,
}

impl Session {
    /// Create a fresh pending session with an unpredictable id.
    pub fn new(
        provider_id: String,
        voice_id: String,
        language: Option<String>,
        text: String,
        target_format: AudioFormat,
        target_sample_rate_hz: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider_id,
            voice_id,
            language,
            text,
            target_format,
            target_sample_rate_hz,
            status: SessionStatus::Pending,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_graph() {
        use SessionStatus::*;
        assert!(Pending.can_transition_to(Streaming));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Streaming.can_transition_to(Completed));
        assert!(Streaming.can_transition_to(Failed));
        assert!(Streaming.can_transition_to(Cancelled));

        // No regressions, no skips.
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Streaming.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Streaming));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Streaming));
    }

    #[test]
    fn test_new_sessions_are_pending_with_unique_ids() {
        let a = Session::new(
            "mock_tone".into(),
            "en-US-mock-1".into(),
            None,
            "hi".into(),
            AudioFormat::Pcm16,
            16_000,
        );
        let b = Session::new(
            "mock_tone".into(),
            "en-US-mock-1".into(),
            None,
            "hi".into(),
            AudioFormat::Pcm16,
            16_000,
        );
        assert_eq!(a.status, SessionStatus::Pending);
        assert_ne!(a.id, b.id);
        assert!(a.started_at.is_none());
        assert!(a.finished_at.is_none());
    }
}
