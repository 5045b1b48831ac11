//! # activisor
//!
//! **Activisor** is a per-device activity manager: a long-lived service that
//! accepts declarative descriptions of background work ("activities"),
//! delays their execution until declared preconditions ("requirements") are
//! satisfied, and then admits them to execution under concurrency limits and
//! priority classes. It decides *when* background work may run; it never
//! performs the work itself.
//!
//! ## Features
//!
//! | Area             | Description                                                        | Key types / traits                         |
//! |------------------|--------------------------------------------------------------------|--------------------------------------------|
//! | **Activities**   | Declarative definitions with requirements, triggers, schedules.    | [`ActivityDefinition`], [`Activity`]       |
//! | **Scheduling**   | Nine run queues, FIFO admission, concurrency caps, fair yielding.  | [`ActivityManager`], [`QueueName`]         |
//! | **Requirements** | Named preconditions from providers (connectivity included).        | [`RequirementProvider`], [`ConnectivityProvider`] |
//! | **Triggers**     | Provider streams filtered through declarative predicates.          | [`Trigger`], [`WhereMatcher`]              |
//! | **Service**      | Single-actor event loop with a command channel.                    | [`ActivityService`], [`ServiceHandle`]     |
//! | **Events**       | Seq-numbered lifecycle events on a broadcast bus.                  | [`Event`], [`EventKind`], [`Bus`]          |
//! | **Errors**       | Structured error kinds mapped to wire codes.                       | [`ManagerError`], [`ErrorCode`]            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//! - `random-ids`: draw activity ids from a uniform random source instead of
//!   the sequential allocator.
//!
//! ```no_run
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use activisor::{ActivityService, ConnectivityProvider, ManagerConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ManagerConfig::default();
//!     let (service, handle) =
//!         ActivityService::new(cfg, vec![Box::new(ConnectivityProvider::new())], Vec::new());
//!
//!     let token = CancellationToken::new();
//!     let run = tokio::spawn(service.run(token.clone()));
//!
//!     // Register a background activity gated on internet connectivity.
//!     let id = handle
//!         .create(serde_json::from_value(json!({
//!             "name": "sync",
//!             "creator": {"type": "named", "id": "com.example.sync"},
//!             "requirements": {"internet": true}
//!         }))?)
//!         .await?;
//!     handle.start(id).await?;
//!
//!     token.cancel();
//!     let _ = run.await?;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod associations;
pub mod config;
pub mod error;
pub mod events;
pub mod matcher;
pub mod persist;
pub mod requirements;
pub mod scheduler;
pub mod subscribers;
pub mod trigger;

// ---- Public re-exports ----

pub use activity::{
    Activity, ActivityDefinition, ActivityFlags, ActivityId, ActivityState, BusId, PriorityClass,
    ScheduleSpec, TriggerSpec,
};
pub use associations::ResourceAssociations;
pub use config::{enable, Concurrency, ManagerConfig};
pub use error::{ErrorCode, ManagerError};
pub use events::{Bus, Event, EventKind};
pub use matcher::{MatchResult, MatcherError, WhereMatcher};
pub use requirements::{
    Completion, Confidence, ConnectivityProvider, ProviderRegistry, RequirementBinding,
    RequirementCore, RequirementProvider,
};
pub use scheduler::{ActivityManager, ActivityService, Command, CommandOutcome, QueueName, ServiceHandle};
pub use subscribers::{Subscribe, SubscriberSet};
pub use trigger::Trigger;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
