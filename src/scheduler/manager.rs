//! # Activity manager - the admission scheduler.
//!
//! The manager owns every activity by id and drives each one through the
//! nine run queues:
//!
//! ```text
//! create ──► [initialized] ──► [scheduled] ──► [ready] ─────────► [background]
//!    (start + manager enabled)      │             │    admission      │
//!                                   │             └───► [readyInteractive]
//!                                   │   requirements met,     │         │
//!                                   │   trigger fired,        └► [backgroundInteractive]
//!                                   │   schedule reached                │
//!                                   │                                   ▼
//!                                   ◄──── requirement lapsed ──── [ended] ◄── stop/cancel/complete
//!
//! immediate flag: [scheduled] ──► [immediate] (no concurrency gating)
//! eviction:       [background] ──► [longBackground] (frees a counted slot)
//! ```
//!
//! ## Rules
//! - Admission is FIFO within each ready queue; interactive admissions are
//!   tried first and `|background| + |backgroundInteractive|` never exceeds
//!   the applicable concurrency level (unless unlimited).
//! - While interactive work is waiting, the yield timer periodically asks
//!   one running interactive activity to yield, but never more than the
//!   number of waiters.
//! - An activity is on at most one queue; `current_queue` is the marker and
//!   the manager self-heals (log + coerce) when the two disagree.
//! - Providers and timers hand the manager ids, never references; ids that
//!   are gone are tolerated.
//!
//! All methods run on the service's event loop; nothing here blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::activity::{
    Activity, ActivityDefinition, ActivityId, ActivityState, BusId,
};
use crate::associations::ResourceAssociations;
use crate::config::{enable, Concurrency, ManagerConfig};
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::requirements::{
    Completion, ProviderRegistry, RequirementBroadcast, RequirementEvent,
};
use crate::trigger::Trigger;

use super::command::Command;
use super::queues::{QueueName, QueueSet};

/// The scheduler: id/name registry, run queues, admission, focus, yield.
pub struct ActivityManager {
    enabled: u8,
    background_concurrency: Concurrency,
    background_interactive_concurrency: Concurrency,

    /// Every allocated, not-yet-destroyed activity, by id.
    table: BTreeMap<ActivityId, Activity>,
    /// Registered (not released) ids. `table` minus `live` is the leaked set.
    live: BTreeSet<ActivityId>,
    /// `(name, creator)` → id for registered activities.
    names: BTreeMap<(String, BusId), ActivityId>,

    queues: QueueSet,
    focused: Vec<ActivityId>,

    // The yield timer is data here; the service owns the actual sleep and
    // re-arms it whenever the generation moves.
    yield_armed: bool,
    yield_generation: u64,

    registry: ProviderRegistry,
    associations: Arc<ResourceAssociations>,
    bus: Bus,

    #[cfg(not(feature = "random-ids"))]
    next_activity_id: ActivityId,
}

impl ActivityManager {
    /// Creates a manager with the given providers and shared association
    /// index. Scheduling begins once all enable bits are set.
    pub fn new(
        config: &ManagerConfig,
        registry: ProviderRegistry,
        associations: Arc<ResourceAssociations>,
        bus: Bus,
    ) -> Self {
        Self {
            enabled: config.initial_enable_mask & enable::MASK,
            background_concurrency: config.background_concurrency,
            background_interactive_concurrency: config.background_interactive_concurrency,
            table: BTreeMap::new(),
            live: BTreeSet::new(),
            names: BTreeMap::new(),
            queues: QueueSet::new(),
            focused: Vec::new(),
            yield_armed: false,
            yield_generation: 0,
            registry,
            associations,
            bus,
            #[cfg(not(feature = "random-ids"))]
            next_activity_id: 1,
        }
    }

    // ---------------------------
    // Registration and lookup
    // ---------------------------

    /// Accepts a definition: validates, allocates an id, instantiates the
    /// requirement bindings, and registers the activity in `initialized`.
    pub fn create(
        &mut self,
        definition: ActivityDefinition,
        now: DateTime<Utc>,
    ) -> Result<ActivityId, ManagerError> {
        let id = self.allocate_id();
        self.register(definition, id, now)
    }

    /// Accepts a definition under a caller-chosen id; restore uses this to
    /// re-create persisted activities under their prior ids. A live
    /// duplicate id is rejected.
    pub fn create_with_id(
        &mut self,
        definition: ActivityDefinition,
        id: ActivityId,
        now: DateTime<Utc>,
    ) -> Result<ActivityId, ManagerError> {
        if id == 0 {
            return Err(ManagerError::validation("activity id 0 is reserved"));
        }
        if self.table.contains_key(&id) {
            return Err(ManagerError::IdConflict { id });
        }
        self.register(definition, id, now)
    }

    fn register(
        &mut self,
        definition: ActivityDefinition,
        id: ActivityId,
        now: DateTime<Utc>,
    ) -> Result<ActivityId, ManagerError> {
        definition.validate()?;

        let key = (definition.name.clone(), definition.creator.clone());
        if self.names.contains_key(&key) {
            return Err(ManagerError::NameConflict {
                name: definition.name.clone(),
                creator: definition.creator.to_string(),
            });
        }

        let trigger = match &definition.trigger {
            Some(spec) => Some(Trigger::new(
                &spec.method,
                spec.params.clone(),
                spec.where_clause.clone(),
            )?),
            None => None,
        };

        let mut requirements = Vec::new();
        if let Some(requested) = &definition.requirements {
            for (name, value) in requested {
                match self.registry.instantiate(id, name, value) {
                    Ok(binding) => requirements.push(binding),
                    Err(err) => {
                        // Roll back the bindings already taken out.
                        self.registry.unlink_activity(id);
                        return Err(err);
                    }
                }
            }
        }

        let mut activity = Activity::new(id, definition, requirements, trigger);
        if let Some(schedule) = &activity.definition.schedule {
            let due = schedule.first_due(now);
            if due <= now {
                activity.schedule_met = true;
            } else {
                activity.next_due = Some(due);
            }
        }

        let name = activity.definition.name.clone();
        debug!(activity = id, name = %name, "activity registered");

        self.names.insert(key, id);
        self.live.insert(id);
        self.table.insert(id, activity);
        self.enqueue(id, QueueName::Initialized);
        self.publish(
            Event::now(EventKind::ActivityCreated)
                .with_activity(id)
                .with_name(name),
        );

        Ok(id)
    }

    #[cfg(not(feature = "random-ids"))]
    fn allocate_id(&mut self) -> ActivityId {
        // Sequential ids, skipping ids still alive. Id 0 is reserved.
        loop {
            let id = self.next_activity_id;
            self.next_activity_id = self.next_activity_id.wrapping_add(1).max(1);
            if !self.table.contains_key(&id) {
                return id;
            }
        }
    }

    #[cfg(feature = "random-ids")]
    fn allocate_id(&mut self) -> ActivityId {
        use rand::Rng;

        // Uniform random ids with collision retry. Id 0 is reserved.
        let mut rng = rand::thread_rng();
        loop {
            let id: ActivityId = rng.gen();
            if id != 0 && !self.table.contains_key(&id) {
                return id;
            }
        }
    }

    /// Looks up a registered activity by `(name, creator)`.
    ///
    /// Anonymous callers address activities by name alone.
    pub fn lookup(&self, name: &str, creator: &BusId) -> Result<ActivityId, ManagerError> {
        let found = if creator.is_anonymous() {
            self.names
                .range((name.to_string(), BusId::named(""))..)
                .take_while(|((candidate, _), _)| candidate.as_str() == name)
                .map(|(_, &id)| id)
                .next()
        } else {
            self.names
                .get(&(name.to_string(), creator.clone()))
                .copied()
        };

        found.ok_or_else(|| ManagerError::NoSuchName {
            name: name.to_string(),
            creator: creator.to_string(),
        })
    }

    /// Read access for introspection and tests.
    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.table.get(&id)
    }

    /// Ids present in the id table but no longer registered: activities
    /// released while subscribers are still draining.
    pub fn leaked(&self) -> Vec<ActivityId> {
        self.table
            .keys()
            .filter(|id| !self.live.contains(id))
            .copied()
            .collect()
    }

    fn require_live(&self, id: ActivityId) -> Result<(), ManagerError> {
        if self.live.contains(&id) && self.table.contains_key(&id) {
            Ok(())
        } else {
            Err(ManagerError::NoSuchActivity { id })
        }
    }

    // ---------------------------
    // Commands
    // ---------------------------

    /// `start`: begins the lifecycle. Only has effect in `initialized` (the
    /// activity waits for the manager to be enabled) and `paused` (resumes).
    pub fn start(&mut self, id: ActivityId, now: DateTime<Utc>) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "start");

        let state = {
            let Some(activity) = self.table.get_mut(&id) else {
                return Err(ManagerError::NoSuchActivity { id });
            };
            let state = activity.state;
            if matches!(state, ActivityState::Initialized | ActivityState::Paused) {
                activity.started = true;
            }
            state
        };

        match state {
            ActivityState::Initialized if self.is_enabled() => self.permit_schedule(id, now),
            ActivityState::Paused => self.permit_schedule(id, now),
            _ => {}
        }
        Ok(())
    }

    /// `stop`: graceful end; the activity drains its subscribers and parks
    /// on `ended`. Idempotent once ending.
    pub fn stop(&mut self, id: ActivityId, now: DateTime<Utc>) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "stop");

        match self.table.get(&id).map(|a| a.state) {
            Some(ActivityState::Ending) | Some(ActivityState::Ended) => Ok(()),
            Some(_) => {
                self.begin_end(id, false, now);
                Ok(())
            }
            None => Err(ManagerError::NoSuchActivity { id }),
        }
    }

    /// `cancel`: forced end from any state. Subscribers are dissociated
    /// immediately; a second cancel of an ended activity is still OK.
    pub fn cancel(&mut self, id: ActivityId, now: DateTime<Utc>) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "cancel");

        match self.table.get(&id).map(|a| a.state) {
            Some(ActivityState::Ended) => Ok(()),
            Some(_) => {
                self.remove_focus_for_end(id);
                if let Some(activity) = self.table.get_mut(&id) {
                    activity.restart_on_end = false;
                    activity.state = ActivityState::Ending;
                    if let Some(trigger) = activity.trigger.as_mut() {
                        trigger.disarm();
                    }
                    activity.subscribers.clear();
                }
                self.publish(Event::now(EventKind::ActivityEnding).with_activity(id));
                self.finish_end(id, now);
                Ok(())
            }
            None => Err(ManagerError::NoSuchActivity { id }),
        }
    }

    /// `pause`: parks the activity until a new `start`.
    pub fn pause(&mut self, id: ActivityId) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "pause");

        match self.table.get(&id).map(|a| a.state) {
            Some(ActivityState::Paused) => Ok(()),
            Some(
                ActivityState::Running
                | ActivityState::Ready
                | ActivityState::Scheduled
                | ActivityState::Initialized,
            ) => {
                self.enqueue(id, QueueName::Scheduled);
                if let Some(activity) = self.table.get_mut(&id) {
                    activity.state = ActivityState::Paused;
                    activity.yielding = false;
                }
                self.publish(Event::now(EventKind::ActivityPaused).with_activity(id));
                // A running slot may have been freed.
                self.check_ready_queue();
                Ok(())
            }
            Some(_) => Err(ManagerError::invalid_state(
                "pause is not applicable to an ending or ended activity",
            )),
            None => Err(ManagerError::NoSuchActivity { id }),
        }
    }

    /// `complete`: the work finished. Continuous activities restart through
    /// the ended queue with the trigger re-armed.
    pub fn complete(&mut self, id: ActivityId, now: DateTime<Utc>) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "complete");

        match self.table.get(&id).map(|a| a.state) {
            Some(ActivityState::Ended) | Some(ActivityState::Ending) => Ok(()),
            Some(ActivityState::Running) => {
                self.begin_end(id, true, now);
                Ok(())
            }
            Some(state) => Err(ManagerError::invalid_state(format!(
                "complete is only applicable to a running activity (state is {})",
                state.as_str()
            ))),
            None => Err(ManagerError::NoSuchActivity { id }),
        }
    }

    /// `yield`: asks a running background-interactive activity to wind down
    /// so a waiting one can run.
    pub fn yield_activity(&mut self, id: ActivityId) -> Result<(), ManagerError> {
        self.require_live(id)?;

        let eligible = self.table.get(&id).map_or(false, |activity| {
            activity.state == ActivityState::Running
                && activity.current_queue == Some(QueueName::BackgroundInteractive)
        });
        if !eligible {
            return Err(ManagerError::invalid_state(
                "yield is only meaningful while running in backgroundInteractive",
            ));
        }

        let already = self.table.get(&id).map_or(false, |a| a.yielding);
        if !already {
            self.request_yield(id);
        }
        Ok(())
    }

    /// `release`: the parent drops the activity. It leaves the registry at
    /// once and is destroyed when the last subscriber departs (immediately
    /// when there are none). Until then it shows up as leaked.
    pub fn release(&mut self, id: ActivityId, _now: DateTime<Utc>) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "releasing");

        self.remove_focus_for_end(id);
        self.unlink_queue(id);

        let (key, no_subscribers) = {
            let Some(activity) = self.table.get_mut(&id) else {
                return Err(ManagerError::NoSuchActivity { id });
            };
            activity.released = true;
            (
                (
                    activity.definition.name.clone(),
                    activity.definition.creator.clone(),
                ),
                activity.subscribers.is_empty(),
            )
        };

        self.names.remove(&key);
        self.live.remove(&id);
        self.registry.unlink_activity(id);
        self.publish(Event::now(EventKind::ActivityReleased).with_activity(id));

        if no_subscribers {
            self.destroy(id);
        }

        // A running slot may have been freed.
        self.check_ready_queue();
        Ok(())
    }

    /// `adopt`: a subscriber joins the activity.
    pub fn adopt(&mut self, id: ActivityId, subscriber: BusId) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, subscriber = %subscriber, "gained subscriber");

        if let Some(activity) = self.table.get_mut(&id) {
            activity.subscribers.insert(subscriber.clone());
        }
        self.associations.associate(id, subscriber);
        Ok(())
    }

    /// A subscriber departs. Ending activities finish when the last one
    /// leaves; released activities are destroyed.
    pub fn remove_subscriber(
        &mut self,
        id: ActivityId,
        subscriber: &BusId,
        now: DateTime<Utc>,
    ) -> Result<(), ManagerError> {
        // Released activities are still draining; resolve through the table.
        let (state, released, empty) = {
            let Some(activity) = self.table.get_mut(&id) else {
                return Err(ManagerError::NoSuchActivity { id });
            };
            if !activity.subscribers.remove(subscriber) {
                debug!(activity = id, subscriber = %subscriber, "departing subscriber was not attached");
            }
            (
                activity.state,
                activity.released,
                activity.subscribers.is_empty(),
            )
        };

        debug!(activity = id, subscriber = %subscriber, "lost subscriber");
        self.associations.dissociate(id, subscriber);

        if empty {
            if state == ActivityState::Ending {
                self.finish_end(id, now);
            } else if released {
                self.destroy(id);
                self.check_ready_queue();
            }
        }
        Ok(())
    }

    // ---------------------------
    // Focus
    // ---------------------------

    /// Exclusive focus: `id` becomes the only focused activity, displacing
    /// every previously focused one.
    pub fn focus(&mut self, id: ActivityId) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "focus");

        if self.table.get(&id).map_or(false, |a| a.focused) {
            debug!(activity = id, "already focused");
            return Ok(());
        }

        if let Some(activity) = self.table.get_mut(&id) {
            activity.focused = true;
        }
        self.associations.set_focused(id, true);

        let previously_focused = std::mem::take(&mut self.focused);
        self.focused.push(id);
        self.publish(Event::now(EventKind::FocusGained).with_activity(id));

        for previous in previously_focused {
            debug!(activity = previous, "removing focus from previously focused activity");
            if let Some(activity) = self.table.get_mut(&previous) {
                activity.focused = false;
            }
            self.associations.set_focused(previous, false);
            self.publish(Event::now(EventKind::FocusLost).with_activity(previous));
        }
        Ok(())
    }

    /// Removes focus from `id`. Unfocusing an unfocused activity is an
    /// error.
    pub fn unfocus(&mut self, id: ActivityId) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "unfocus");

        if !self.table.get(&id).map_or(false, |a| a.focused) {
            return Err(ManagerError::invalid_state(
                "cannot remove focus from an activity that is not focused",
            ));
        }

        if let Some(activity) = self.table.get_mut(&id) {
            activity.focused = false;
        }
        self.associations.set_focused(id, false);

        if let Some(position) = self.focused.iter().position(|&f| f == id) {
            self.focused.remove(position);
        } else {
            warn!(activity = id, "activity not on focused list while removing focus");
        }
        self.publish(Event::now(EventKind::FocusLost).with_activity(id));
        Ok(())
    }

    /// Additive focus: `target` joins the focused set. The source must
    /// already be focused; an already-focused target is fine.
    pub fn add_focus(
        &mut self,
        source: ActivityId,
        target: ActivityId,
    ) -> Result<(), ManagerError> {
        self.require_live(source)?;
        self.require_live(target)?;
        debug!(source, target, "add focus");

        if !self.table.get(&source).map_or(false, |a| a.focused) {
            return Err(ManagerError::invalid_state(
                "cannot add focus from an activity that is not focused",
            ));
        }
        if self.table.get(&target).map_or(false, |a| a.focused) {
            debug!(target, "target is already focused");
            return Ok(());
        }

        if let Some(activity) = self.table.get_mut(&target) {
            activity.focused = true;
        }
        self.associations.set_focused(target, true);
        self.focused.push(target);
        self.publish(Event::now(EventKind::FocusGained).with_activity(target));
        Ok(())
    }

    /// The focused set, in focus order (for introspection and tests).
    pub fn focused_set(&self) -> &[ActivityId] {
        &self.focused
    }

    // ---------------------------
    // Enable / configuration
    // ---------------------------

    /// Sets enable bits; when all are set, the initialized queue drains into
    /// scheduled.
    pub fn enable(&mut self, mask: u8, now: DateTime<Utc>) {
        if mask & enable::EXTERNAL != 0 {
            debug!("enabling activity manager: external");
        }
        if mask & enable::UI != 0 {
            debug!("enabling activity manager: device ui");
        }
        if mask & !enable::MASK != 0 {
            debug!(mask, "unknown bits set in enable mask");
        }

        self.enabled |= mask & enable::MASK;
        if self.is_enabled() {
            self.schedule_all_activities(now);
        }
    }

    /// Clears enable bits. Running activities are left alone; no new ones
    /// are admitted to scheduling.
    pub fn disable(&mut self, mask: u8) {
        if mask & enable::EXTERNAL != 0 {
            debug!("disabling activity manager: external");
        }
        if mask & enable::UI != 0 {
            debug!("disabling activity manager: device ui");
        }
        if mask & !enable::MASK != 0 {
            debug!(mask, "unknown bits set in disable mask");
        }

        self.enabled &= !mask;
    }

    /// True when every enable bit is set.
    pub fn is_enabled(&self) -> bool {
        self.enabled & enable::MASK == enable::MASK
    }

    /// Enables every registered requirement provider.
    pub fn enable_providers(&mut self) {
        self.registry.enable_all();
    }

    /// Disables every registered requirement provider.
    pub fn disable_providers(&mut self) {
        self.registry.disable_all();
    }

    /// Changes the background concurrency level; returns the old one.
    pub fn set_background_concurrency(&mut self, level: Concurrency) -> Concurrency {
        debug!(?level, "background concurrency level changed");
        let old = self.background_concurrency;
        self.background_concurrency = level;
        // May want to run more background activities.
        self.check_ready_queue();
        old
    }

    /// Changes the interactive concurrency level; returns the old one.
    pub fn set_background_interactive_concurrency(&mut self, level: Concurrency) -> Concurrency {
        debug!(?level, "background interactive concurrency level changed");
        let old = self.background_interactive_concurrency;
        self.background_interactive_concurrency = level;
        self.check_ready_queue();
        old
    }

    /// Moves one running background activity to the long-background list,
    /// freeing a counted slot.
    pub fn evict_background_activity(&mut self, id: ActivityId) -> Result<(), ManagerError> {
        self.require_live(id)?;
        debug!(activity = id, "evicting from background queue");

        if self.table.get(&id).and_then(|a| a.current_queue) != Some(QueueName::Background) {
            warn!(activity = id, "activity not on background queue");
            return Err(ManagerError::invalid_state(
                "activity is not on the background queue",
            ));
        }

        self.enqueue(id, QueueName::LongBackground);
        self.check_ready_queue();
        Ok(())
    }

    /// Moves every running background activity to the long-background list.
    pub fn evict_all_background(&mut self) {
        debug!("evicting all background activities to the long background list");
        let running: Vec<ActivityId> = self.queues.iter(QueueName::Background).collect();
        for id in running {
            self.enqueue(id, QueueName::LongBackground);
        }
        self.check_ready_queue();
    }

    // ---------------------------
    // Scheduling
    // ---------------------------

    fn schedule_all_activities(&mut self, now: DateTime<Utc>) {
        debug!("scheduling all activities");

        let pending: Vec<ActivityId> = self
            .queues
            .iter(QueueName::Initialized)
            .filter(|id| self.table.get(id).map_or(false, |a| a.started))
            .collect();

        for id in pending {
            debug!(activity = id, "granting permission to schedule");
            self.permit_schedule(id, now);
        }
    }

    fn permit_schedule(&mut self, id: ActivityId, _now: DateTime<Utc>) {
        self.enqueue(id, QueueName::Scheduled);
        if let Some(activity) = self.table.get_mut(&id) {
            activity.state = ActivityState::Scheduled;
        }
        self.publish(Event::now(EventKind::ActivityScheduled).with_activity(id));
        self.evaluate_readiness(id);
    }

    /// Moves the activity toward or away from readiness after any
    /// precondition change.
    fn evaluate_readiness(&mut self, id: ActivityId) {
        if !self.live.contains(&id) {
            return;
        }
        let Some(activity) = self.table.get(&id) else {
            return;
        };

        match activity.state {
            ActivityState::Scheduled if activity.is_runnable() => self.inform_ready(id),
            ActivityState::Ready | ActivityState::Running if !activity.is_runnable() => {
                self.inform_not_ready(id)
            }
            _ => {}
        }
    }

    fn inform_ready(&mut self, id: ActivityId) {
        debug!(activity = id, "now ready to run");

        let (immediate, interactive) = match self.table.get(&id) {
            Some(activity) => (
                activity.definition.flags.immediate,
                activity.definition.flags.user_initiated,
            ),
            None => return,
        };

        if immediate {
            // Immediate activities bypass the background queues entirely.
            self.enqueue(id, QueueName::Immediate);
            self.publish(
                Event::now(EventKind::ActivityReady)
                    .with_activity(id)
                    .with_queue(QueueName::Immediate.as_str()),
            );
            self.run_activity(id, QueueName::Immediate);
        } else {
            let queue = if interactive {
                QueueName::ReadyInteractive
            } else {
                QueueName::Ready
            };
            self.enqueue(id, queue);
            if let Some(activity) = self.table.get_mut(&id) {
                activity.state = ActivityState::Ready;
            }
            self.publish(
                Event::now(EventKind::ActivityReady)
                    .with_activity(id)
                    .with_queue(queue.as_str()),
            );
            self.check_ready_queue();
        }
    }

    fn inform_not_ready(&mut self, id: ActivityId) {
        debug!(activity = id, "no longer ready to run");

        self.enqueue(id, QueueName::Scheduled);
        if let Some(activity) = self.table.get_mut(&id) {
            activity.state = ActivityState::Scheduled;
            activity.yielding = false;
        }
        self.publish(Event::now(EventKind::ActivityNotReady).with_activity(id));
        // The activity may have vacated a running slot.
        self.check_ready_queue();
    }

    fn running_background_count(&self) -> usize {
        self.queues.len(QueueName::Background) + self.queues.len(QueueName::BackgroundInteractive)
    }

    /// The admission pass. Invoked whenever readiness, capacity, or
    /// concurrency levels change.
    fn check_ready_queue(&mut self) {
        debug!("checking to see if more background activities can run");

        let mut ran_interactive = false;
        while self
            .background_interactive_concurrency
            .admits(self.running_background_count())
            && !self.queues.is_empty(QueueName::ReadyInteractive)
        {
            let Some(id) = self.queues.front(QueueName::ReadyInteractive) else {
                break;
            };
            self.admit(id, QueueName::BackgroundInteractive);
            ran_interactive = true;
        }

        if !self.queues.is_empty(QueueName::ReadyInteractive) {
            // Interactive work is starving; (re-)arm the yield timer.
            if ran_interactive || !self.yield_armed {
                self.arm_yield_timer();
            }
        } else if self.yield_armed {
            self.cancel_yield_timer();
        }

        while self
            .background_concurrency
            .admits(self.running_background_count())
            && !self.queues.is_empty(QueueName::Ready)
        {
            let Some(id) = self.queues.front(QueueName::Ready) else {
                break;
            };
            self.admit(id, QueueName::Background);
        }
    }

    fn admit(&mut self, id: ActivityId, queue: QueueName) {
        debug!(activity = id, queue = queue.as_str(), "admitting");
        self.enqueue(id, queue);
        self.run_activity(id, queue);
    }

    fn run_activity(&mut self, id: ActivityId, queue: QueueName) {
        let focused = {
            let Some(activity) = self.table.get_mut(&id) else {
                return;
            };
            activity.state = ActivityState::Running;
            activity.focused
        };
        // Keep the shared index aware of the running activity.
        self.associations.set_focused(id, focused);
        self.publish(
            Event::now(EventKind::ActivityRunning)
                .with_activity(id)
                .with_queue(queue.as_str()),
        );
    }

    // ---------------------------
    // Yield policy
    // ---------------------------

    fn arm_yield_timer(&mut self) {
        debug!("arming background interactive yield timeout");
        self.yield_armed = true;
        self.yield_generation = self.yield_generation.wrapping_add(1);
    }

    fn cancel_yield_timer(&mut self) {
        debug!("cancelling background interactive yield timeout");
        self.yield_armed = false;
    }

    /// Yield timer state for the service loop: `(armed, generation)`. The
    /// generation moves on every re-arm so the service can reset its sleep.
    pub fn yield_timer(&self) -> (bool, u64) {
        (self.yield_armed, self.yield_generation)
    }

    /// The yield timer fired: pick at most one more victim, but only while
    /// fewer activities are yielding than are waiting in the interactive
    /// ready queue. Re-arms itself while waiters remain.
    pub fn on_yield_timeout(&mut self) {
        debug!("background interactive yield timeout triggered");
        self.yield_armed = false;

        if self.queues.is_empty(QueueName::ReadyInteractive) {
            debug!("ready interactive queue is empty, cancelling yield timeout");
            return;
        }

        let waiting = self.queues.len(QueueName::ReadyInteractive);
        let mut yielding = 0usize;
        let mut victim = None;
        let mut enough_yielding = false;

        for id in self.queues.iter(QueueName::BackgroundInteractive) {
            let Some(activity) = self.table.get(&id) else {
                continue;
            };
            if activity.yielding {
                yielding += 1;
                if yielding >= waiting {
                    enough_yielding = true;
                    break;
                }
            } else if victim.is_none() {
                victim = Some(id);
            }
        }

        if enough_yielding {
            debug!("yielding activities already match the number of waiting interactive activities");
        } else if let Some(victim) = victim {
            self.request_yield(victim);
        } else {
            debug!("all running background interactive activities are already yielding");
        }

        self.arm_yield_timer();
    }

    fn request_yield(&mut self, id: ActivityId) {
        debug!(activity = id, "requesting yield");
        if let Some(activity) = self.table.get_mut(&id) {
            activity.yielding = true;
        }
        self.publish(Event::now(EventKind::ActivityYieldRequested).with_activity(id));
    }

    // ---------------------------
    // Requirement / trigger / schedule input
    // ---------------------------

    /// Routes one upstream completion to the named provider and applies the
    /// resulting transitions in commit order.
    pub fn ingest_provider(&mut self, provider: &str, completion: Completion) {
        let outcome = self.registry.ingest(provider, completion);
        if outcome.provider_disabled {
            self.publish(Event::now(EventKind::ProviderDisabled).with_name(provider.to_string()));
        }
        for broadcast in outcome.broadcasts {
            self.apply_requirement_event(broadcast);
        }
    }

    fn apply_requirement_event(&mut self, broadcast: RequirementBroadcast) {
        let id = broadcast.activity;

        let Some(activity) = self.table.get_mut(&id) else {
            // The binding outlived its activity; the provider list will be
            // pruned on the next unlink.
            debug!(activity = id, "requirement broadcast for departed activity");
            return;
        };
        let Some(binding) = activity.find_binding_mut(broadcast.requirement) else {
            warn!(
                activity = id,
                requirement = broadcast.requirement,
                "requirement broadcast for unbound requirement"
            );
            return;
        };

        let kind = match broadcast.event {
            RequirementEvent::Met => {
                binding.met = true;
                EventKind::RequirementMet
            }
            RequirementEvent::Unmet => {
                binding.met = false;
                EventKind::RequirementUnmet
            }
            RequirementEvent::Updated => EventKind::RequirementUpdated,
        };

        self.publish(
            Event::now(kind)
                .with_activity(id)
                .with_requirement(broadcast.requirement),
        );

        if broadcast.event != RequirementEvent::Updated {
            self.evaluate_readiness(id);
        }
    }

    /// Feeds one trigger stream update to an activity.
    pub fn deliver_trigger(&mut self, id: ActivityId, payload: &Value) -> Result<(), ManagerError> {
        self.require_live(id)?;

        let fired = {
            let Some(activity) = self.table.get_mut(&id) else {
                return Err(ManagerError::NoSuchActivity { id });
            };
            match activity.trigger.as_mut() {
                Some(trigger) => trigger.deliver(payload),
                None => {
                    return Err(ManagerError::invalid_state(
                        "activity has no trigger",
                    ))
                }
            }
        };

        if fired {
            self.publish(Event::now(EventKind::TriggerFired).with_activity(id));
            self.evaluate_readiness(id);
        }
        Ok(())
    }

    /// Wall-clock tick: marks due schedules and re-evaluates.
    pub fn on_timer(&mut self, now: DateTime<Utc>) {
        let due: Vec<ActivityId> = self
            .queues
            .iter(QueueName::Scheduled)
            .filter(|id| {
                self.table.get(id).map_or(false, |activity| {
                    !activity.schedule_met
                        && activity.next_due.map_or(false, |deadline| deadline <= now)
                })
            })
            .collect();

        for id in due {
            debug!(activity = id, "schedule time reached");
            if let Some(activity) = self.table.get_mut(&id) {
                activity.schedule_met = true;
            }
            self.evaluate_readiness(id);
        }
    }

    /// Earliest pending schedule deadline, for the service's timer.
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.queues
            .iter(QueueName::Scheduled)
            .filter_map(|id| self.table.get(&id))
            .filter(|activity| !activity.schedule_met)
            .filter_map(|activity| activity.next_due)
            .min()
    }

    // ---------------------------
    // Ending
    // ---------------------------

    fn begin_end(&mut self, id: ActivityId, restart: bool, now: DateTime<Utc>) {
        // Focus never survives into ending.
        self.remove_focus_for_end(id);

        // A waiting activity must leave its queue now so the admission pass
        // cannot pick it up mid-ending; a running one keeps its slot until
        // the end completes.
        match self.table.get(&id).and_then(|a| a.current_queue) {
            Some(
                QueueName::Background
                | QueueName::BackgroundInteractive
                | QueueName::LongBackground
                | QueueName::Immediate,
            )
            | None => {}
            Some(_) => self.unlink_queue(id),
        }

        let no_subscribers = {
            let Some(activity) = self.table.get_mut(&id) else {
                return;
            };
            activity.restart_on_end = restart;
            activity.state = ActivityState::Ending;
            if let Some(trigger) = activity.trigger.as_mut() {
                trigger.disarm();
            }
            activity.subscribers.is_empty()
        };

        self.publish(Event::now(EventKind::ActivityEnding).with_activity(id));
        if no_subscribers {
            self.finish_end(id, now);
        }
    }

    fn finish_end(&mut self, id: ActivityId, now: DateTime<Utc>) {
        self.enqueue(id, QueueName::Ended);

        let (restart, released) = {
            let Some(activity) = self.table.get_mut(&id) else {
                return;
            };
            activity.state = ActivityState::Ended;
            activity.yielding = false;
            (
                activity.restart_on_end && activity.definition.flags.continuous && !activity.released,
                activity.released,
            )
        };

        self.associations.dissociate_all(id);
        self.publish(Event::now(EventKind::ActivityEnded).with_activity(id));

        if restart {
            self.restart_activity(id, now);
        } else if released {
            self.destroy(id);
        }

        // The ended activity freed a running slot.
        self.check_ready_queue();
    }

    fn restart_activity(&mut self, id: ActivityId, now: DateTime<Utc>) {
        debug!(activity = id, "restart policy re-arming activity");

        let started = {
            let Some(activity) = self.table.get_mut(&id) else {
                return;
            };
            activity.restart_on_end = false;
            // Restarts reset the trigger to armed.
            if let Some(trigger) = activity.trigger.as_mut() {
                trigger.rearm();
            }
            if let Some(schedule) = &activity.definition.schedule {
                let previous = activity.next_due.unwrap_or(now);
                match schedule.next_due(previous, now) {
                    Some(deadline) => {
                        activity.schedule_met = false;
                        activity.next_due = Some(deadline);
                    }
                    None => {
                        // Start-only schedule: the moment already passed.
                        activity.schedule_met = schedule.first_due(now) <= now;
                        activity.next_due = None;
                    }
                }
            }
            activity.started
        };

        self.publish(Event::now(EventKind::ActivityRestarted).with_activity(id));

        if started && self.is_enabled() {
            self.permit_schedule(id, now);
        } else {
            self.enqueue(id, QueueName::Initialized);
            if let Some(activity) = self.table.get_mut(&id) {
                activity.state = ActivityState::Initialized;
            }
        }
    }

    fn remove_focus_for_end(&mut self, id: ActivityId) {
        if !self.table.get(&id).map_or(false, |a| a.focused) {
            return;
        }
        if let Some(activity) = self.table.get_mut(&id) {
            activity.focused = false;
        }
        self.associations.set_focused(id, false);
        if let Some(position) = self.focused.iter().position(|&f| f == id) {
            self.focused.remove(position);
        }
        self.publish(Event::now(EventKind::FocusLost).with_activity(id));
    }

    fn destroy(&mut self, id: ActivityId) {
        debug!(activity = id, "destroying");

        self.unlink_queue(id);
        self.registry.unlink_activity(id);
        self.associations.dissociate_all(id);
        if let Some(activity) = self.table.remove(&id) {
            self.names.remove(&(
                activity.definition.name.clone(),
                activity.definition.creator.clone(),
            ));
        }
        self.live.remove(&id);
    }

    // ---------------------------
    // Queue bookkeeping
    // ---------------------------

    /// Removes the activity from its recorded queue, self-healing when the
    /// marker and the containers disagree.
    fn unlink_queue(&mut self, id: ActivityId) {
        let Some(activity) = self.table.get_mut(&id) else {
            return;
        };
        let Some(queue) = activity.current_queue.take() else {
            return;
        };
        if !self.queues.remove(queue, id) {
            warn!(
                activity = id,
                queue = queue.as_str(),
                "activity missing from its recorded run queue"
            );
        }
    }

    fn enqueue(&mut self, id: ActivityId, queue: QueueName) {
        self.unlink_queue(id);
        if let Some(activity) = self.table.get_mut(&id) {
            activity.current_queue = Some(queue);
            self.queues.push_back(queue, id);
        }
    }

    // ---------------------------
    // Introspection / persistence
    // ---------------------------

    /// The `list` payload: non-empty queues with their activities, plus the
    /// leaked set when it is non-empty.
    pub fn info(&self) -> Value {
        let mut queues = Vec::new();
        for queue in QueueName::ALL {
            if self.queues.is_empty(queue) {
                continue;
            }
            let activities: Vec<Value> = self
                .queues
                .iter(queue)
                .filter_map(|id| self.table.get(&id))
                .map(Activity::identity_json)
                .collect();
            queues.push(json!({
                "name": queue.as_str(),
                "activities": activities,
            }));
        }

        let mut rep = Map::new();
        if !queues.is_empty() {
            rep.insert("queues".to_string(), Value::Array(queues));
        }

        let leaked = self.leaked();
        if !leaked.is_empty() {
            let entries: Vec<Value> = leaked
                .iter()
                .filter_map(|id| self.table.get(id))
                .map(Activity::identity_json)
                .collect();
            rep.insert("leakedActivities".to_string(), Value::Array(entries));
        }

        Value::Object(rep)
    }

    /// Introspection snapshot of every provider, keyed by provider name.
    pub fn provider_info(&self) -> Value {
        self.registry.snapshot()
    }

    /// The `getDetails` payload for one activity (leaked ones included).
    pub fn details(&self, id: ActivityId) -> Result<Value, ManagerError> {
        self.table
            .get(&id)
            .map(Activity::detail_json)
            .ok_or(ManagerError::NoSuchActivity { id })
    }

    /// Ids and definitions of live persistent activities, for saving on
    /// shutdown.
    pub fn persistent_activities(&self) -> Vec<(ActivityId, ActivityDefinition)> {
        self.live
            .iter()
            .filter_map(|id| self.table.get(id))
            .filter(|activity| activity.definition.flags.persistent)
            .map(|activity| (activity.id, activity.definition.clone()))
            .collect()
    }

    // ---------------------------
    // Command dispatch
    // ---------------------------

    /// Executes one bus command against the scheduler state.
    pub fn execute(&mut self, command: Command, now: DateTime<Utc>) -> Result<Value, ManagerError> {
        match command {
            Command::Create { definition } => self
                .create(definition, now)
                .map(|id| json!({ "activityId": id })),
            Command::Release { id } => self.release(id, now).map(|_| Value::Null),
            Command::Start { id } => self.start(id, now).map(|_| Value::Null),
            Command::Stop { id } => self.stop(id, now).map(|_| Value::Null),
            Command::Cancel { id } => self.cancel(id, now).map(|_| Value::Null),
            Command::Pause { id } => self.pause(id).map(|_| Value::Null),
            Command::Complete { id } => self.complete(id, now).map(|_| Value::Null),
            Command::Yield { id } => self.yield_activity(id).map(|_| Value::Null),
            Command::Focus { id } => self.focus(id).map(|_| Value::Null),
            Command::Unfocus { id } => self.unfocus(id).map(|_| Value::Null),
            Command::AddFocus { source, target } => {
                self.add_focus(source, target).map(|_| Value::Null)
            }
            Command::Adopt { id, subscriber } => self
                .adopt(id, subscriber)
                .map(|_| json!({ "activityId": id })),
            Command::Unsubscribe { id, subscriber } => self
                .remove_subscriber(id, &subscriber, now)
                .map(|_| Value::Null),
            Command::List => Ok(self.info()),
            Command::GetDetails { id } => self.details(id),
            Command::Enable { mask } => {
                self.enable(mask, now);
                Ok(Value::Null)
            }
            Command::Disable { mask } => {
                self.disable(mask);
                Ok(Value::Null)
            }
            Command::ProviderUpdate {
                provider,
                completion,
            } => {
                self.ingest_provider(&provider, completion);
                Ok(Value::Null)
            }
            Command::TriggerUpdate { id, payload } => {
                self.deliver_trigger(id, &payload).map(|_| Value::Null)
            }
        }
    }

    fn publish(&self, event: Event) {
        self.bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::ConnectivityProvider;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn manager_with(config: ManagerConfig) -> ActivityManager {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(ConnectivityProvider::new()));
        let mut manager = ActivityManager::new(
            &config,
            registry,
            Arc::new(ResourceAssociations::new()),
            Bus::new(256),
        );
        manager.enable_providers();
        manager
    }

    fn manager() -> ActivityManager {
        manager_with(ManagerConfig::default())
    }

    fn definition(name: &str) -> ActivityDefinition {
        serde_json::from_value(json!({
            "name": name,
            "creator": {"type": "named", "id": "com.example.test"}
        }))
        .expect("definition")
    }

    fn definition_with(name: &str, extra: Value) -> ActivityDefinition {
        let mut base = json!({
            "name": name,
            "creator": {"type": "named", "id": "com.example.test"}
        });
        if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
            for (key, value) in extra_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(base).expect("definition")
    }

    fn create_started(manager: &mut ActivityManager, def: ActivityDefinition) -> ActivityId {
        let id = manager.create(def, now()).expect("create");
        manager.start(id, now()).expect("start");
        id
    }

    fn queue_of(manager: &ActivityManager, id: ActivityId) -> Option<QueueName> {
        manager.activity(id).and_then(Activity::current_queue)
    }

    fn internet_up() -> Completion {
        Completion::Ok(json!({
            "isInternetConnectionAvailable": true,
            "wifi": {"state": "connected", "onInternet": "yes",
                     "networkConfidenceLevel": "fair"}
        }))
    }

    #[test]
    fn basic_admission_respects_the_background_level() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Limited(2);
        let mut manager = manager_with(config);

        let a = create_started(&mut manager, definition("a"));
        let b = create_started(&mut manager, definition("b"));
        let c = create_started(&mut manager, definition("c"));

        assert_eq!(queue_of(&manager, a), Some(QueueName::Background));
        assert_eq!(queue_of(&manager, b), Some(QueueName::Background));
        assert_eq!(queue_of(&manager, c), Some(QueueName::Ready));
        assert_eq!(manager.activity(c).map(|x| x.state()), Some(ActivityState::Ready));

        manager.release(a, now()).expect("release");
        assert_eq!(queue_of(&manager, c), Some(QueueName::Background));
        assert_eq!(
            manager.activity(c).map(|x| x.state()),
            Some(ActivityState::Running)
        );
    }

    #[test]
    fn admission_is_fifo_within_the_ready_queue() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Limited(1);
        let mut manager = manager_with(config);

        let first = create_started(&mut manager, definition("first"));
        let second = create_started(&mut manager, definition("second"));
        let third = create_started(&mut manager, definition("third"));

        assert_eq!(queue_of(&manager, first), Some(QueueName::Background));
        manager.complete(first, now()).expect("complete");
        assert_eq!(queue_of(&manager, second), Some(QueueName::Background));
        manager.complete(second, now()).expect("complete");
        assert_eq!(queue_of(&manager, third), Some(QueueName::Background));
    }

    #[test]
    fn unlimited_concurrency_admits_everything() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Unlimited;
        let mut manager = manager_with(config);

        for name in ["a", "b", "c", "d", "e"] {
            let id = create_started(&mut manager, definition(name));
            assert_eq!(queue_of(&manager, id), Some(QueueName::Background));
        }
    }

    #[test]
    fn interactive_waiter_arms_the_yield_timer_and_yields_one_victim() {
        let mut config = ManagerConfig::default();
        config.background_interactive_concurrency = Concurrency::Limited(1);
        let mut manager = manager_with(config);

        let x = create_started(
            &mut manager,
            definition_with("x", json!({"flags": {"userInitiated": true}})),
        );
        let y = create_started(
            &mut manager,
            definition_with("y", json!({"flags": {"userInitiated": true}})),
        );

        assert_eq!(queue_of(&manager, x), Some(QueueName::BackgroundInteractive));
        assert_eq!(queue_of(&manager, y), Some(QueueName::ReadyInteractive));
        let (armed, _) = manager.yield_timer();
        assert!(armed);

        manager.on_yield_timeout();
        assert!(manager.activity(x).map_or(false, Activity::is_yielding));
        let (armed, _) = manager.yield_timer();
        assert!(armed);

        // A second timeout finds enough activities already yielding.
        manager.on_yield_timeout();
        assert!(!manager.activity(y).map_or(false, Activity::is_yielding));

        // The victim winds down cooperatively; the waiter is admitted.
        manager.complete(x, now()).expect("complete");
        assert_eq!(queue_of(&manager, y), Some(QueueName::BackgroundInteractive));
        assert_eq!(
            manager.activity(y).map(|a| a.state()),
            Some(ActivityState::Running)
        );
        // No more waiters: the timer is cancelled.
        let (armed, _) = manager.yield_timer();
        assert!(!armed);
    }

    #[test]
    fn yield_timer_stays_cancelled_without_interactive_waiters() {
        let mut manager = manager();
        let id = create_started(
            &mut manager,
            definition_with("solo", json!({"flags": {"userInitiated": true}})),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::BackgroundInteractive));
        let (armed, _) = manager.yield_timer();
        assert!(!armed);
    }

    #[test]
    fn requirement_gates_scheduling_until_met() {
        let mut manager = manager();
        let id = create_started(
            &mut manager,
            definition_with("online", json!({"requirements": {"internet": true}})),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));

        manager.ingest_provider("connectivity", internet_up());
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));

        // The requirement lapsing while running restarts the wait.
        manager.ingest_provider(
            "connectivity",
            Completion::Ok(json!({"isInternetConnectionAvailable": false})),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Scheduled)
        );
    }

    #[test]
    fn confidence_levels_gate_independently() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Limited(2);
        let mut manager = manager_with(config);

        let modest = create_started(
            &mut manager,
            definition_with("modest", json!({"requirements": {"wifiConfidence": "poor"}})),
        );
        let demanding = create_started(
            &mut manager,
            definition_with(
                "demanding",
                json!({"requirements": {"wifiConfidence": "excellent"}}),
            ),
        );

        manager.ingest_provider("connectivity", internet_up());

        assert_eq!(queue_of(&manager, modest), Some(QueueName::Background));
        assert_eq!(queue_of(&manager, demanding), Some(QueueName::Scheduled));
    }

    #[test]
    fn trigger_gates_until_a_matching_update() {
        let mut manager = manager();
        let id = create_started(
            &mut manager,
            definition_with(
                "triggered",
                json!({"trigger": {
                    "method": "luna://com.example/powerd/charging",
                    "where": {"prop": "charging", "op": "=", "val": true}
                }}),
            ),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));

        manager
            .deliver_trigger(id, &json!({"charging": false}))
            .expect("deliver");
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));

        manager
            .deliver_trigger(id, &json!({"charging": true}))
            .expect("deliver");
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));
    }

    #[test]
    fn immediate_activities_bypass_concurrency_gating() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Limited(1);
        let mut manager = manager_with(config);

        let background = create_started(&mut manager, definition("bg"));
        assert_eq!(queue_of(&manager, background), Some(QueueName::Background));

        let urgent = create_started(
            &mut manager,
            definition_with("urgent", json!({"flags": {"immediate": true}})),
        );
        assert_eq!(queue_of(&manager, urgent), Some(QueueName::Immediate));
        assert_eq!(
            manager.activity(urgent).map(|a| a.state()),
            Some(ActivityState::Running)
        );
    }

    #[test]
    fn focus_is_exclusive_and_add_focus_is_additive() {
        let mut manager = manager();
        let a = create_started(&mut manager, definition("a"));
        let b = create_started(&mut manager, definition("b"));
        let c = create_started(&mut manager, definition("c"));

        manager.focus(a).expect("focus a");
        assert!(manager.activity(a).map_or(false, Activity::is_focused));

        manager.focus(b).expect("focus b");
        assert!(!manager.activity(a).map_or(false, Activity::is_focused));
        assert!(manager.activity(b).map_or(false, Activity::is_focused));
        assert_eq!(manager.focused_set(), &[b]);

        manager.add_focus(b, c).expect("add focus");
        assert_eq!(manager.focused_set(), &[b, c]);

        // Source must be focused.
        assert!(manager.add_focus(a, c).is_err());
        // Unfocusing an unfocused activity is an error.
        assert!(manager.unfocus(a).is_err());
    }

    #[test]
    fn ending_removes_the_activity_from_the_focused_set() {
        let mut manager = manager();
        let a = create_started(&mut manager, definition("a"));
        manager.focus(a).expect("focus");

        manager.cancel(a, now()).expect("cancel");
        assert!(manager.focused_set().is_empty());
        assert!(!manager.activity(a).map_or(true, Activity::is_focused));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut manager = manager();
        let id = create_started(&mut manager, definition("doomed"));

        manager.cancel(id, now()).expect("first cancel");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Ended)
        );
        manager.cancel(id, now()).expect("second cancel");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Ended)
        );
    }

    #[test]
    fn duplicate_name_for_the_same_creator_is_rejected() {
        let mut manager = manager();
        manager.create(definition("twin"), now()).expect("create");

        let err = manager.create(definition("twin"), now()).expect_err("conflict");
        assert_eq!(err.code(), crate::error::ErrorCode::AlreadyRegistered);

        // A different creator may reuse the name.
        let other: ActivityDefinition = serde_json::from_value(json!({
            "name": "twin",
            "creator": {"type": "named", "id": "com.example.other"}
        }))
        .expect("definition");
        assert!(manager.create(other, now()).is_ok());
    }

    #[test]
    fn released_activity_with_subscribers_shows_up_as_leaked() {
        let mut manager = manager();
        let id = create_started(&mut manager, definition("watched"));
        manager
            .adopt(id, BusId::named("com.example.watcher"))
            .expect("adopt");

        manager.release(id, now()).expect("release");
        assert_eq!(manager.leaked(), vec![id]);

        let info = manager.info();
        assert!(info.get("leakedActivities").is_some());

        manager
            .remove_subscriber(id, &BusId::named("com.example.watcher"), now())
            .expect("unsubscribe");
        assert!(manager.leaked().is_empty());
        assert!(manager.activity(id).is_none());
    }

    #[test]
    fn stop_waits_for_subscribers_to_drain() {
        let mut manager = manager();
        let id = create_started(&mut manager, definition("draining"));
        let watcher = BusId::named("com.example.watcher");
        manager.adopt(id, watcher.clone()).expect("adopt");

        manager.stop(id, now()).expect("stop");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Ending)
        );

        manager
            .remove_subscriber(id, &watcher, now())
            .expect("unsubscribe");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Ended)
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Ended));
    }

    #[test]
    fn stopping_a_waiting_activity_takes_it_off_the_ready_queue() {
        let mut manager = manager();
        let running = create_started(&mut manager, definition("running"));
        let waiting = create_started(&mut manager, definition("waiting"));
        assert_eq!(queue_of(&manager, waiting), Some(QueueName::Ready));

        let watcher = BusId::named("com.example.watcher");
        manager.adopt(waiting, watcher.clone()).expect("adopt");
        manager.stop(waiting, now()).expect("stop");
        assert_eq!(queue_of(&manager, waiting), None);

        // The freed slot must not resurrect the ending activity.
        manager.complete(running, now()).expect("complete");
        assert_eq!(
            manager.activity(waiting).map(|a| a.state()),
            Some(ActivityState::Ending)
        );

        manager
            .remove_subscriber(waiting, &watcher, now())
            .expect("unsubscribe");
        assert_eq!(queue_of(&manager, waiting), Some(QueueName::Ended));
    }

    #[test]
    fn continuous_activities_restart_after_completion() {
        let mut manager = manager();
        let id = create_started(
            &mut manager,
            definition_with("heartbeat", json!({"flags": {"continuous": true}})),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));

        manager.complete(id, now()).expect("complete");
        // Straight back through ended into the runnable path.
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Running)
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));
    }

    #[test]
    fn manager_disabled_until_all_bits_are_set() {
        let mut config = ManagerConfig::default();
        config.initial_enable_mask = enable::EXTERNAL;
        let mut manager = manager_with(config);

        let id = create_started(&mut manager, definition("waiting"));
        assert_eq!(queue_of(&manager, id), Some(QueueName::Initialized));

        manager.enable(enable::UI, now());
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));
    }

    #[test]
    fn schedule_defers_readiness_until_due() {
        let mut manager = manager();
        let start = Utc::now() + chrono::Duration::minutes(10);
        let id = create_started(
            &mut manager,
            definition_with(
                "later",
                json!({"schedule": {"start": start.to_rfc3339()}}),
            ),
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));
        assert!(manager.next_wakeup().is_some());

        manager.on_timer(start + chrono::Duration::seconds(1));
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));
        assert!(manager.next_wakeup().is_none());
    }

    #[test]
    fn pause_parks_and_start_resumes() {
        let mut manager = manager();
        let id = create_started(&mut manager, definition("pausable"));
        assert_eq!(queue_of(&manager, id), Some(QueueName::Background));

        manager.pause(id).expect("pause");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Paused)
        );
        assert_eq!(queue_of(&manager, id), Some(QueueName::Scheduled));

        manager.start(id, now()).expect("resume");
        assert_eq!(
            manager.activity(id).map(|a| a.state()),
            Some(ActivityState::Running)
        );
    }

    #[test]
    fn eviction_frees_a_counted_slot() {
        let mut config = ManagerConfig::default();
        config.background_concurrency = Concurrency::Limited(1);
        let mut manager = manager_with(config);

        let long_runner = create_started(&mut manager, definition("long"));
        let waiter = create_started(&mut manager, definition("waiter"));
        assert_eq!(queue_of(&manager, waiter), Some(QueueName::Ready));

        manager.evict_background_activity(long_runner).expect("evict");
        assert_eq!(queue_of(&manager, long_runner), Some(QueueName::LongBackground));
        assert_eq!(
            manager.activity(long_runner).map(|a| a.priority()),
            Some(crate::activity::PriorityClass::LongBackground)
        );
        assert_eq!(queue_of(&manager, waiter), Some(QueueName::Background));
    }

    #[test]
    fn raising_the_concurrency_level_admits_waiters() {
        let mut manager = manager();
        let a = create_started(&mut manager, definition("a"));
        let b = create_started(&mut manager, definition("b"));
        assert_eq!(queue_of(&manager, a), Some(QueueName::Background));
        assert_eq!(queue_of(&manager, b), Some(QueueName::Ready));

        let old = manager.set_background_concurrency(Concurrency::Limited(2));
        assert_eq!(old, Concurrency::Limited(1));
        assert_eq!(queue_of(&manager, b), Some(QueueName::Background));
    }

    #[test]
    fn info_lists_only_non_empty_queues_with_exact_names() {
        let mut manager = manager();
        let id = create_started(&mut manager, definition("listed"));

        let info = manager.info();
        let queues = info["queues"].as_array().expect("queues");
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0]["name"], json!("background"));
        assert_eq!(queues[0]["activities"][0]["activityId"], json!(id));
        assert!(info.get("leakedActivities").is_none());
    }

    #[test]
    fn provider_info_reports_connectivity_state() {
        let mut manager = manager();
        manager.ingest_provider(
            "connectivity",
            Completion::Ok(json!({
                "isInternetConnectionAvailable": true,
                "wifi": {"state": "connected", "onInternet": "yes",
                         "networkConfidenceLevel": "excellent"}
            })),
        );

        let info = manager.provider_info();
        assert_eq!(info["connectivity"]["internetAvailable"], json!(true));
        assert_eq!(info["connectivity"]["wifiConfidence"], json!("excellent"));
    }

    #[test]
    fn lookup_by_name_honors_anonymous_wildcards() {
        let mut manager = manager();
        let id = manager.create(definition("findme"), now()).expect("create");

        let creator = BusId::named("com.example.test");
        assert_eq!(manager.lookup("findme", &creator).expect("exact"), id);
        assert_eq!(
            manager.lookup("findme", &BusId::Anonymous).expect("anon"),
            id
        );
        assert!(manager.lookup("findme", &BusId::named("someone.else")).is_err());
    }

    #[test]
    fn force_allocation_rejects_live_ids() {
        let mut manager = manager();
        let id = manager
            .create_with_id(definition("pinned"), 77, now())
            .expect("create");
        assert_eq!(id, 77);

        let err = manager
            .create_with_id(definition("other"), 77, now())
            .expect_err("conflict");
        assert_eq!(err.code(), crate::error::ErrorCode::AlreadyRegistered);

        assert!(manager.create_with_id(definition("zero"), 0, now()).is_err());

        // The sequential allocator skips the pinned id.
        let mut allocated = Vec::new();
        for index in 0..80 {
            let fresh = manager
                .create(definition(&format!("seq{index}")), now())
                .expect("create");
            allocated.push(fresh);
        }
        assert!(!allocated.contains(&77));
    }

    #[test]
    fn unknown_requirement_is_rejected_without_state_change() {
        let mut manager = manager();
        let err = manager
            .create(
                definition_with("bad", json!({"requirements": {"gravity": true}})),
                now(),
            )
            .expect_err("unknown requirement");
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArg);
        assert!(manager.info().get("queues").is_none());
    }
}
