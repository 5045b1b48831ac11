//! The scheduler-owned activity record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::requirements::RequirementBinding;
use crate::scheduler::QueueName;
use crate::trigger::Trigger;

use super::definition::{ActivityDefinition, PriorityClass};
use super::identity::BusId;
use super::state::ActivityState;
use super::ActivityId;

/// One activity: definition plus all scheduler-visible runtime state.
///
/// Owned by the scheduler's table; everything else refers to it by id.
/// The `current_queue` marker and the queue containers are kept in sync by
/// the manager; membership on a run queue is mutually exclusive.
#[derive(Debug)]
pub struct Activity {
    pub(crate) id: ActivityId,
    pub(crate) definition: ActivityDefinition,
    pub(crate) state: ActivityState,
    pub(crate) current_queue: Option<QueueName>,
    pub(crate) requirements: Vec<RequirementBinding>,
    pub(crate) trigger: Option<Trigger>,
    pub(crate) next_due: Option<DateTime<Utc>>,
    pub(crate) schedule_met: bool,
    pub(crate) subscribers: BTreeSet<BusId>,
    pub(crate) focused: bool,
    pub(crate) yielding: bool,
    pub(crate) started: bool,
    pub(crate) released: bool,
    pub(crate) restart_on_end: bool,
}

impl Activity {
    /// Creates a freshly registered activity in the initialized state.
    pub(crate) fn new(
        id: ActivityId,
        definition: ActivityDefinition,
        requirements: Vec<RequirementBinding>,
        trigger: Option<Trigger>,
    ) -> Self {
        let schedule_met = definition.schedule.is_none();
        Self {
            id,
            definition,
            state: ActivityState::Initialized,
            current_queue: None,
            requirements,
            trigger,
            next_due: None,
            schedule_met,
            subscribers: BTreeSet::new(),
            focused: false,
            yielding: false,
            started: false,
            released: false,
            restart_on_end: false,
        }
    }

    /// Activity id.
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// Activity name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Creator identity.
    pub fn creator(&self) -> &BusId {
        &self.definition.creator
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Which run queue the activity currently sits on, if any.
    pub fn current_queue(&self) -> Option<QueueName> {
        self.current_queue
    }

    /// The definition the activity was created from.
    pub fn definition(&self) -> &ActivityDefinition {
        &self.definition
    }

    /// Whether the activity is focused.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Whether the activity has been asked to yield.
    pub fn is_yielding(&self) -> bool {
        self.yielding
    }

    /// Subscribers currently attached.
    pub fn subscribers(&self) -> &BTreeSet<BusId> {
        &self.subscribers
    }

    /// Priority class, accounting for eviction to the long-background list.
    pub fn priority(&self) -> PriorityClass {
        if self.current_queue == Some(QueueName::LongBackground) {
            PriorityClass::LongBackground
        } else {
            self.definition.priority()
        }
    }

    /// True when every precondition holds: started, all requirements met,
    /// trigger fired (if any), schedule time reached (if any).
    pub(crate) fn is_runnable(&self) -> bool {
        self.started
            && self.schedule_met
            && self.requirements.iter().all(|binding| binding.met)
            && self
                .trigger
                .as_ref()
                .map_or(true, |trigger| trigger.is_fired())
    }

    pub(crate) fn find_binding_mut(&mut self, name: &str) -> Option<&mut RequirementBinding> {
        self.requirements
            .iter_mut()
            .find(|binding| binding.name == name)
    }

    /// Short identity for queue listings.
    pub(crate) fn identity_json(&self) -> Value {
        json!({
            "activityId": self.id,
            "name": self.definition.name,
            "creator": self.definition.creator,
        })
    }

    /// Full introspection record for `getDetails`.
    pub(crate) fn detail_json(&self) -> Value {
        let requirements: Vec<Value> = self
            .requirements
            .iter()
            .map(|binding| {
                json!({
                    "name": binding.name,
                    "value": binding.value,
                    "met": binding.met,
                })
            })
            .collect();

        let mut detail = serde_json::Map::new();
        detail.insert("activityId".to_string(), json!(self.id));
        detail.insert("name".to_string(), json!(self.definition.name));
        detail.insert("creator".to_string(), json!(self.definition.creator));
        detail.insert("state".to_string(), json!(self.state.as_str()));
        detail.insert("focused".to_string(), json!(self.focused));
        detail.insert("yielding".to_string(), json!(self.yielding));
        detail.insert(
            "subscribers".to_string(),
            json!(self.subscribers.iter().cloned().collect::<Vec<_>>()),
        );
        detail.insert("requirements".to_string(), Value::Array(requirements));
        if let Some(queue) = self.current_queue {
            detail.insert("queue".to_string(), json!(queue.as_str()));
        }
        if let Some(trigger) = &self.trigger {
            detail.insert(
                "trigger".to_string(),
                json!({
                    "method": trigger.method(),
                    "fired": trigger.is_fired(),
                    "armed": trigger.is_armed(),
                }),
            );
        }
        if let Some(schedule) = &self.definition.schedule {
            detail.insert("schedule".to_string(), json!(schedule));
        }
        Value::Object(detail)
    }
}
