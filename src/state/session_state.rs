/// Capture session lifecycle
///
/// `Created -> Configuring -> Navigating -> Extracting -> Finalizing -> Closed`,
/// with `Failed` reachable from any state before `Finalizing`. A failed
/// session still passes through `Finalizing` so its tab gets closed.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Configuring,
    Navigating,
    Extracting,
    Finalizing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if the session may move from this state to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Configuring)
                | (Configuring, Navigating)
                | (Navigating, Extracting)
                | (Extracting, Finalizing)
                | (Created | Configuring | Navigating | Extracting, Failed)
                | (Failed, Finalizing)
                | (Finalizing, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configuring => "configuring",
            Self::Navigating => "navigating",
            Self::Extracting => "extracting",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let path = [
            SessionState::Created,
            SessionState::Configuring,
            SessionState::Navigating,
            SessionState::Extracting,
            SessionState::Finalizing,
            SessionState::Closed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failure_converges_on_finalizing() {
        for state in [
            SessionState::Created,
            SessionState::Configuring,
            SessionState::Navigating,
            SessionState::Extracting,
        ] {
            assert!(state.can_transition_to(SessionState::Failed));
        }
        assert!(SessionState::Failed.can_transition_to(SessionState::Finalizing));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Closed));
        assert!(!SessionState::Closed.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Finalizing.can_transition_to(SessionState::Failed));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!SessionState::Created.can_transition_to(SessionState::Extracting));
        assert!(!SessionState::Navigating.can_transition_to(SessionState::Closed));
        assert!(SessionState::Closed.is_terminal());
    }
}
