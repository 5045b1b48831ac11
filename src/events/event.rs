//! # Runtime events emitted by the activity manager.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: activity state transitions (created, scheduled,
//!   ready, running, ending, ended, restarted)
//! - **Admission events**: scheduler decisions (yield requests, focus moves)
//! - **Requirement events**: provider transitions observed by bindings
//! - **Subscriber events**: fan-out worker incidents (overflow, panic)
//!
//! The [`Event`] struct carries metadata such as the activity id, queue name,
//! requirement name, and a free-form reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::activity::ActivityId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Activity lifecycle events ===
    /// Definition accepted, activity registered.
    ActivityCreated,
    /// Activity granted permission to schedule.
    ActivityScheduled,
    /// All preconditions met; waiting for admission.
    ActivityReady,
    /// A precondition lapsed; back to the scheduled queue.
    ActivityNotReady,
    /// Admitted to a running queue.
    ActivityRunning,
    /// Paused by command.
    ActivityPaused,
    /// Ending; subscribers may still be draining.
    ActivityEnding,
    /// Reached the ended queue.
    ActivityEnded,
    /// Restart policy re-armed the activity.
    ActivityRestarted,
    /// Released by its parent; will be destroyed once subscribers depart.
    ActivityReleased,

    // === Admission / focus events ===
    /// A running interactive activity was asked to yield.
    ActivityYieldRequested,
    /// Activity gained focus.
    FocusGained,
    /// Activity lost focus.
    FocusLost,

    // === Requirement / trigger events ===
    /// A bound requirement became met.
    RequirementMet,
    /// A bound requirement became unmet.
    RequirementUnmet,
    /// A bound requirement's value changed without a met flip.
    RequirementUpdated,
    /// An armed trigger matched an update.
    TriggerFired,
    /// A provider hit a permanent upstream failure and was disabled.
    ProviderDisabled,

    // === Command plane ===
    /// A bus command was rejected (validation, conflict, not-found).
    CommandRejected,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: Unique sequence number for ordering (monotonically increasing)
/// - `at`: Wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: Event classification
/// - `activity`, `name`, `queue`, `requirement`, `reason`: Optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Activity id, if applicable.
    pub activity: Option<ActivityId>,
    /// Activity name, if applicable.
    pub name: Option<String>,
    /// Run-queue the event refers to, if applicable.
    pub queue: Option<&'static str>,
    /// Requirement name, for requirement events.
    pub requirement: Option<String>,
    /// Free-form reason (rejection text, provider failure, yield cause).
    pub reason: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            activity: None,
            name: None,
            queue: None,
            requirement: None,
            reason: None,
        }
    }

    /// Attaches an activity id.
    pub fn with_activity(mut self, id: ActivityId) -> Self {
        self.activity = Some(id);
        self
    }

    /// Attaches an activity name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a run-queue name.
    pub fn with_queue(mut self, queue: &'static str) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attaches a requirement name.
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirement = Some(requirement.into());
        self
    }

    /// Attaches a free-form reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber panic event.
    ///
    /// Emitted when a subscriber panics during event processing.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }
}
