//! # ActivityService: the event loop that owns the manager.
//!
//! All scheduler state lives inside one actor task. Commands arrive over a
//! bounded mpsc channel through a cloneable [`ServiceHandle`]; the yield
//! timer and schedule deadlines are the only other wake sources. Nothing
//! outside the loop ever touches the manager, so every mutation is a single
//! uninterrupted step.
//!
//! ## Architecture
//! ```text
//! ServiceHandle::execute(cmd) ──► [mpsc] ──► ActivityService::run()
//!                                               │
//!                                               ├──► manager.execute(cmd)     (commands)
//!                                               ├──► manager.on_yield_timeout (yield timer)
//!                                               ├──► manager.on_timer         (schedule deadlines)
//!                                               │
//!                                               └──► Bus ──► subscriber_listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - The yield timer is re-armed whenever the manager's timer generation
//!   moves; cancel/re-arm is race-free because both live on the loop.
//! - On shutdown (token cancelled or all handles dropped) persistent
//!   activity definitions are saved; on startup they are restored into
//!   `initialized`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::activity::{ActivityDefinition, ActivityId, BusId};
use crate::associations::ResourceAssociations;
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::persist;
use crate::requirements::{Completion, ProviderRegistry, RequirementProvider};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::command::{Command, CommandOutcome};
use super::manager::ActivityManager;

/// Idle deadline for disarmed timers; the `if armed` guards keep them from
/// firing.
const IDLE_TICK: Duration = Duration::from_secs(3600);

struct Envelope {
    command: Command,
    reply: oneshot::Sender<Result<Value, ManagerError>>,
}

/// Handle for submitting commands to the service.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ServiceHandle {
    /// Submits a command and waits for its reply.
    pub async fn execute(&self, command: Command) -> Result<Value, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { command, reply })
            .await
            .map_err(|_| ManagerError::ServiceClosed)?;
        rx.await.map_err(|_| ManagerError::ServiceClosed)?
    }

    /// Submits a command and folds the reply into the wire-level outcome.
    pub async fn outcome(&self, command: Command) -> CommandOutcome {
        CommandOutcome::from(self.execute(command).await)
    }

    /// Creates an activity and returns its id.
    pub async fn create(&self, definition: ActivityDefinition) -> Result<ActivityId, ManagerError> {
        let reply = self.execute(Command::Create { definition }).await?;
        reply
            .get("activityId")
            .and_then(Value::as_u64)
            .ok_or_else(|| ManagerError::Internal {
                reason: "create reply missing activityId".to_string(),
            })
    }

    /// `start` an activity.
    pub async fn start(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Start { id }).await.map(|_| ())
    }

    /// `stop` an activity.
    pub async fn stop(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Stop { id }).await.map(|_| ())
    }

    /// `cancel` an activity.
    pub async fn cancel(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Cancel { id }).await.map(|_| ())
    }

    /// `pause` an activity.
    pub async fn pause(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Pause { id }).await.map(|_| ())
    }

    /// `complete` an activity.
    pub async fn complete(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Complete { id }).await.map(|_| ())
    }

    /// `release` an activity.
    pub async fn release(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Release { id }).await.map(|_| ())
    }

    /// Exclusive focus.
    pub async fn focus(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Focus { id }).await.map(|_| ())
    }

    /// Remove focus.
    pub async fn unfocus(&self, id: ActivityId) -> Result<(), ManagerError> {
        self.execute(Command::Unfocus { id }).await.map(|_| ())
    }

    /// Additive focus.
    pub async fn add_focus(
        &self,
        source: ActivityId,
        target: ActivityId,
    ) -> Result<(), ManagerError> {
        self.execute(Command::AddFocus { source, target })
            .await
            .map(|_| ())
    }

    /// A subscriber joins the activity.
    pub async fn adopt(&self, id: ActivityId, subscriber: BusId) -> Result<(), ManagerError> {
        self.execute(Command::Adopt { id, subscriber })
            .await
            .map(|_| ())
    }

    /// A subscriber departs.
    pub async fn unsubscribe(&self, id: ActivityId, subscriber: BusId) -> Result<(), ManagerError> {
        self.execute(Command::Unsubscribe { id, subscriber })
            .await
            .map(|_| ())
    }

    /// Queue listing plus the leaked set.
    pub async fn list(&self) -> Result<Value, ManagerError> {
        self.execute(Command::List).await
    }

    /// Full record for one activity.
    pub async fn details(&self, id: ActivityId) -> Result<Value, ManagerError> {
        self.execute(Command::GetDetails { id }).await
    }

    /// Routes an upstream completion to a provider.
    pub async fn provider_update(
        &self,
        provider: impl Into<String>,
        completion: Completion,
    ) -> Result<(), ManagerError> {
        self.execute(Command::ProviderUpdate {
            provider: provider.into(),
            completion,
        })
        .await
        .map(|_| ())
    }

    /// Feeds a trigger stream update to an activity.
    pub async fn trigger_update(&self, id: ActivityId, payload: Value) -> Result<(), ManagerError> {
        self.execute(Command::TriggerUpdate { id, payload })
            .await
            .map(|_| ())
    }
}

/// The service actor. Built with providers and subscribers, then driven by
/// [`ActivityService::run`].
pub struct ActivityService {
    config: ManagerConfig,
    manager: ActivityManager,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    associations: Arc<ResourceAssociations>,
    rx: mpsc::Receiver<Envelope>,
}

impl ActivityService {
    /// Wires manager, providers, and the shared association index; returns
    /// the service and a command handle.
    pub fn new(
        config: ManagerConfig,
        providers: Vec<Box<dyn RequirementProvider>>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> (Self, ServiceHandle) {
        let bus = Bus::new(config.bus_capacity);
        let associations = Arc::new(ResourceAssociations::new());

        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider);
        }

        let manager = ActivityManager::new(&config, registry, Arc::clone(&associations), bus.clone());
        let (tx, rx) = mpsc::channel(config.command_queue_capacity);

        (
            Self {
                config,
                manager,
                bus,
                subscribers,
                associations,
                rx,
            },
            ServiceHandle { tx },
        )
    }

    /// The event bus (subscribe before spawning `run` to see every event).
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// The shared activity ↔ subscriber index.
    pub fn associations(&self) -> Arc<ResourceAssociations> {
        Arc::clone(&self.associations)
    }

    /// Runs the actor until `token` is cancelled or every handle is dropped.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let ActivityService {
            config,
            mut manager,
            bus,
            subscribers,
            associations: _,
            mut rx,
        } = self;

        // Restore persisted activities into `initialized` under their prior
        // ids.
        if let Some(path) = &config.persist_path {
            match persist::load(path) {
                Ok(records) => {
                    for record in records {
                        let name = record.definition.name.clone();
                        if let Err(err) =
                            manager.create_with_id(record.definition, record.activity_id, Utc::now())
                        {
                            warn!(activity = %name, error = %err, "failed to restore persisted activity");
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to load persisted activities"),
            }
        }

        manager.enable_providers();

        // Fan events out to subscribers from a dedicated listener task.
        let listener_token = token.child_token();
        let listener = spawn_subscriber_listener(
            SubscriberSet::new(subscribers),
            bus.subscribe(),
            listener_token.clone(),
        );

        let yield_sleep = time::sleep(IDLE_TICK);
        tokio::pin!(yield_sleep);
        let schedule_sleep = time::sleep(IDLE_TICK);
        tokio::pin!(schedule_sleep);
        let mut yield_armed = false;
        let mut yield_generation = 0u64;
        let mut schedule_armed = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    persist_definitions(&config, &manager);
                    break;
                }

                envelope = rx.recv() => match envelope {
                    Some(envelope) => {
                        let label = envelope.command.label();
                        let result = manager.execute(envelope.command, Utc::now());
                        if let Err(err) = &result {
                            warn!(command = label, error = %err, code = err.as_label(), "command rejected");
                            bus.publish(
                                Event::now(EventKind::CommandRejected)
                                    .with_name(label)
                                    .with_reason(err.to_string()),
                            );
                        }
                        let _ = envelope.reply.send(result);
                    }
                    None => {
                        debug!("all service handles dropped, shutting down");
                        persist_definitions(&config, &manager);
                        break;
                    }
                },

                _ = &mut yield_sleep, if yield_armed => {
                    manager.on_yield_timeout();
                }

                _ = &mut schedule_sleep, if schedule_armed => {
                    manager.on_timer(Utc::now());
                }
            }

            // Re-sync the timers with the manager's bookkeeping.
            let (armed, generation) = manager.yield_timer();
            if armed && (!yield_armed || generation != yield_generation) {
                yield_sleep
                    .as_mut()
                    .reset(Instant::now() + config.yield_timeout);
            }
            yield_armed = armed;
            yield_generation = generation;

            match manager.next_wakeup() {
                Some(due) => {
                    let delay = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    schedule_sleep.as_mut().reset(Instant::now() + delay);
                    schedule_armed = true;
                }
                None => schedule_armed = false,
            }
        }

        listener_token.cancel();
        let _ = listener.await;
        Ok(())
    }
}

fn persist_definitions(config: &ManagerConfig, manager: &ActivityManager) {
    let Some(path) = &config.persist_path else {
        return;
    };
    let records: Vec<persist::PersistedActivity> = manager
        .persistent_activities()
        .into_iter()
        .map(|(activity_id, definition)| persist::PersistedActivity {
            activity_id,
            definition,
        })
        .collect();
    match persist::save(path, &records) {
        Ok(()) => debug!(count = records.len(), "persisted activity definitions"),
        Err(err) => warn!(error = %err, "failed to persist activity definitions"),
    }
}

fn spawn_subscriber_listener(
    subs: SubscriberSet,
    mut rx: broadcast::Receiver<Arc<Event>>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(event) => subs.emit(&event),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged");
                        continue;
                    }
                }
            }
        }
        subs.shutdown().await;
    })
}
