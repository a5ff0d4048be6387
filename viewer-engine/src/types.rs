use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a playback failure reported by the streaming client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Connectivity or fragment/playlist load failure; recoverable via
    /// backoff and stream reload.
    Network,
    /// Decoder/codec failure; recoverable via in-place repair or codec swap.
    Media,
    /// Anything the streaming client cannot route around; the instance
    /// must be discarded.
    Fatal,
    /// No failure observed yet.
    None,
}

/// Failure notification raised by the streaming client's error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureEvent {
    pub kind: FailureKind,
    pub fatal: bool,
}

impl FailureEvent {
    pub fn fatal(kind: FailureKind) -> Self {
        Self { kind, fatal: true }
    }

    pub fn transient(kind: FailureKind) -> Self {
        Self { kind, fatal: false }
    }
}

/// How one `handle_error` invocation resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// Non-fatal failure; the streaming client self-heals, no action taken.
    Ignored,
    /// Another recovery sequence is already in flight; nothing scheduled.
    Recovering,
    /// Backoff elapsed and a stream reload was issued.
    Retry,
    /// In-place repair brought playback back.
    Success,
    /// Recovery exhausted or impossible; terminal for the caller to handle.
    Failed,
}

/// Normalized result of a recovery attempt. The error handler never
/// propagates an error of its own; every path resolves into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub status: RecoveryStatus,
    /// Retry attempts consumed in the current episode.
    pub attempts: u32,
    pub kind: FailureKind,
}

/// Snapshot of the coordinator's internal state, for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryState {
    pub retry_count: u32,
    pub is_recovering: bool,
    pub last_failure: FailureKind,
}

/// One registered viewing session, kept alive by the shared heartbeat task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSession {
    /// Opaque identifier issued by the session backend.
    pub session_id: String,
    pub camera_id: String,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_wire_labels() {
        assert_eq!(
            serde_json::to_string(&FailureKind::Network).unwrap(),
            "\"network\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::Media).unwrap(),
            "\"media\""
        );
        let parsed: FailureKind = serde_json::from_str("\"fatal\"").unwrap();
        assert_eq!(parsed, FailureKind::Fatal);
    }

    #[test]
    fn test_failure_event_constructors() {
        assert!(FailureEvent::fatal(FailureKind::Network).fatal);
        assert!(!FailureEvent::transient(FailureKind::Media).fatal);
    }
}
