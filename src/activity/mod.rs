//! # Activities: declaratively described units of background work.
//!
//! An activity is the unit the manager schedules: a named definition with
//! requirements, an optional trigger, an optional schedule, priority flags,
//! and a lifecycle state the scheduler drives through the run queues.
//!
//! ## Contents
//! - [`Activity`] per-work-unit record owned by the scheduler
//! - [`ActivityState`] lifecycle states
//! - [`ActivityDefinition`] the JSON-shaped payload submitted by callers
//! - [`BusId`] creator/subscriber identity (named or anonymous)
//! - [`ScheduleSpec`] wall-clock gating
//!
//! ## Rules
//! - Ids are `u64`; 0 is reserved.
//! - `(creator, name)` is unique among currently registered activities.
//! - The scheduler owns every activity by id; everything else holds ids and
//!   re-resolves on each use.

mod definition;
mod identity;
mod record;
mod schedule;
mod state;

pub use definition::{
    ActivityDefinition, ActivityFlags, CallbackSpec, PriorityClass, TriggerSpec,
};
pub use identity::BusId;
pub use record::Activity;
pub use schedule::{parse_interval, ScheduleSpec};
pub use state::ActivityState;

/// Activity identifier. Id 0 is reserved.
pub type ActivityId = u64;
