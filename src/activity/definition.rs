//! The JSON-shaped activity definition submitted by external callers.
//!
//! ```json
//! {
//!   "name": "backup",
//!   "creator": {"type": "named", "id": "com.example.backup"},
//!   "description": "nightly backup",
//!   "requirements": {"internet": true, "wifiConfidence": "fair"},
//!   "trigger": {"method": "luna://…/getStatus", "where": {"prop": "charging", "op": "=", "val": true}},
//!   "schedule": {"start": "2021-05-01T03:00:00Z", "interval": "1d"},
//!   "flags": {"persistent": true, "continuous": true},
//!   "callback": {"method": "luna://com.example.backup/run"}
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ManagerError;

use super::identity::BusId;
use super::schedule::ScheduleSpec;

/// Behavior flags on a definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityFlags {
    /// Bypass the background queues; run as soon as ready.
    pub immediate: bool,
    /// The user is waiting on this work; admit from the interactive queue.
    pub user_initiated: bool,
    /// Survive restarts (definition is persisted on shutdown).
    pub persistent: bool,
    /// Created explicitly by a client rather than recovered.
    pub explicit: bool,
    /// Restart after each completion.
    pub continuous: bool,
}

/// Priority class derived from the flags and the scheduler's placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    /// Never gated by concurrency limits.
    Immediate,
    /// Admitted from the interactive ready queue.
    Interactive,
    /// Plain background work.
    Background,
    /// Background work evicted to the long-running list.
    LongBackground,
}

/// Trigger section of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Bus address of the stream to subscribe.
    pub method: String,
    /// Subscription parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Predicate over stream updates.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
}

/// Callback named by a definition.
///
/// Carried for wire compatibility and round-tripped with the definition;
/// the manager never dispatches it (performing the work is outside the
/// control plane).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackSpec {
    /// Bus address the work runner would call.
    pub method: String,
    /// Call parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A complete activity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    /// Activity name; unique per `(name, creator)`.
    pub name: String,
    /// Who created the activity.
    pub creator: BusId,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Requirement name → requested value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Map<String, Value>>,
    /// Optional trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,
    /// Optional schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSpec>,
    /// Behavior flags.
    #[serde(default, skip_serializing_if = "ActivityFlags::is_default")]
    pub flags: ActivityFlags,
    /// Callback carried with the definition; stored and round-tripped, not
    /// dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackSpec>,
}

impl ActivityFlags {
    fn is_default(&self) -> bool {
        *self == ActivityFlags::default()
    }
}

impl ActivityDefinition {
    /// Validates the definition shape (requirement values are validated by
    /// their providers, the trigger predicate by the matcher).
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.name.is_empty() {
            return Err(ManagerError::validation("activity name must not be empty"));
        }
        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }
        if let Some(trigger) = &self.trigger {
            if trigger.method.is_empty() {
                return Err(ManagerError::validation(
                    "trigger method must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Priority class implied by the flags alone.
    pub fn priority(&self) -> PriorityClass {
        if self.flags.immediate {
            PriorityClass::Immediate
        } else if self.flags.user_initiated {
            PriorityClass::Interactive
        } else {
            PriorityClass::Background
        }
    }
}
