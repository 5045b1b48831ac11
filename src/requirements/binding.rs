//! Per-activity requirement bindings and transition deliveries.

use serde_json::Value;

use crate::activity::ActivityId;

use super::connectivity::Confidence;

/// What kind of condition a binding tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    /// Plain boolean condition; met when the provider says so.
    Boolean,
    /// Ordered-level condition; met when the current level is at least the
    /// requested one.
    EnumLevel {
        /// The requested minimum level.
        level: Confidence,
    },
}

/// One activity's binding to a named requirement.
///
/// Attached to exactly one activity; unlinked from the provider's broadcast
/// list when the activity is released. `met` reflects the core's state at the
/// time of the last broadcast this binding received.
#[derive(Debug, Clone)]
pub struct RequirementBinding {
    /// Requirement name as written in the definition.
    pub name: String,
    /// The comparison value the definition requested.
    pub value: Value,
    /// Condition kind.
    pub kind: RequirementKind,
    /// Last observed met/unmet result.
    pub met: bool,
}

/// A transition observed by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementEvent {
    /// The condition flipped to met.
    Met,
    /// The condition flipped to unmet.
    Unmet,
    /// The value changed but the met state did not flip.
    Updated,
}

/// One delivery from a provider to a bound activity.
///
/// Carries the activity **id**; the scheduler re-resolves it and tolerates
/// ids that are no longer present.
#[derive(Debug, Clone)]
pub struct RequirementBroadcast {
    /// Target activity.
    pub activity: ActivityId,
    /// Requirement name the activity bound.
    pub requirement: &'static str,
    /// The transition.
    pub event: RequirementEvent,
}
