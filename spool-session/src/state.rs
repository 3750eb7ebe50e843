//! Session states and notifications.

use serde::{Deserialize, Serialize};
use spool_core::{Error, Rational};
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a session.
///
/// ```text
/// Unrealized -> Realizing -> Realized -> Prefetching -> Prefetched <-> Started
///                                   any state --close--> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing acquired yet.
    Unrealized,
    /// The realize hook is running.
    Realizing,
    /// Resources are resolved.
    Realized,
    /// The prefetch hook is running.
    Prefetching,
    /// Ready to start without further setup.
    Prefetched,
    /// Media is flowing.
    Started,
    /// Terminal; resources are released.
    Closed,
}

impl SessionState {
    /// Position along the forward path; `None` for `Closed`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Unrealized => Some(0),
            Self::Realizing => Some(1),
            Self::Realized => Some(2),
            Self::Prefetching => Some(3),
            Self::Prefetched => Some(4),
            Self::Started => Some(5),
            Self::Closed => None,
        }
    }

    /// Check if a hook is running toward the next stable state.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Realizing | Self::Prefetching)
    }

    /// Check if this state is at or past `other` on the forward path.
    pub fn has_reached(&self, other: SessionState) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unrealized => "unrealized",
            Self::Realizing => "realizing",
            Self::Realized => "realized",
            Self::Prefetching => "prefetching",
            Self::Prefetched => "prefetched",
            Self::Started => "started",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Notification sent from a session's worker.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The state changed.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// A hook failed; the session is closing.
    Error(Arc<Error>),
    /// Every track reached its end.
    EndOfMedia,
    /// A seek finished; media resumes at or before `time`.
    SeekCompleted {
        /// Requested time.
        time: Rational,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_ordering() {
        assert!(SessionState::Started.has_reached(SessionState::Realized));
        assert!(SessionState::Prefetched.has_reached(SessionState::Prefetched));
        assert!(!SessionState::Realizing.has_reached(SessionState::Realized));
        assert!(!SessionState::Closed.has_reached(SessionState::Unrealized));
        assert!(!SessionState::Started.has_reached(SessionState::Closed));
    }

    #[test]
    fn test_state_serde_names() {
        let json = serde_json::to_string(&SessionState::Prefetched).unwrap();
        assert_eq!(json, "\"prefetched\"");
        assert_eq!(SessionState::Realizing.to_string(), "realizing");
        assert!(SessionState::Prefetching.is_transitional());
    }
}
