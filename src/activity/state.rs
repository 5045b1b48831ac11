//! Lifecycle states.

/// Where an activity is in its lifecycle.
///
/// ```text
/// initialized ──► scheduled ──► ready ──► running ──► ending ──► ended
///                     ▲            │          │                    │
///                     └────────────┴──────────┘        (restart)   │
///                     ▲        requirement lapsed                  │
///                     └────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// Definition accepted and registered; waiting for permission to schedule.
    Initialized,
    /// Waiting for requirements, trigger, and schedule time.
    Scheduled,
    /// All preconditions hold; waiting for admission.
    Ready,
    /// Admitted to a running queue.
    Running,
    /// Suspended by command; resumes through `start`.
    Paused,
    /// Winding down; subscribers may still be draining.
    Ending,
    /// Terminal (until a restart policy re-arms it).
    Ended,
}

impl ActivityState {
    /// Stable external name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Initialized => "initialized",
            ActivityState::Scheduled => "scheduled",
            ActivityState::Ready => "ready",
            ActivityState::Running => "running",
            ActivityState::Paused => "paused",
            ActivityState::Ending => "ending",
            ActivityState::Ended => "ended",
        }
    }
}
