//! # Scheduler: admission control and the service event loop.
//!
//! This module contains the control plane of the crate. The only mutable
//! state lives in [`ActivityManager`], and the only code that touches it is
//! the [`ActivityService`] actor loop.
//!
//! ## Files & responsibilities
//! - **manager.rs**: the synchronous scheduler core - id/name tables, the
//!   nine run queues, admission, the yield policy, focus tracking, leak
//!   detection, command dispatch.
//! - **service.rs**: the async actor that owns the manager; command channel,
//!   yield/schedule timers, subscriber fan-out, persistence on shutdown.
//! - **queues.rs**: [`QueueName`] and the ordered id containers.
//! - **command.rs**: the bus command surface and wire-level outcomes.
//!
//! ## Wiring (module-level flow)
//! ```text
//! Application code
//!   └─ builds ManagerConfig + providers, creates ActivityService, spawns run()
//!
//! ServiceHandle ──► mpsc ──► ActivityService::run()
//!                               ├─ ActivityManager (queues, tables, focus)
//!                               ├─ ProviderRegistry (requirement routing)
//!                               ├─ yield / schedule timers
//!                               └─ Bus ──► subscriber listener ──► SubscriberSet
//! ```

mod command;
mod manager;
mod queues;
mod service;

pub use command::{Command, CommandOutcome};
pub use manager::ActivityManager;
pub use queues::QueueName;
pub use service::{ActivityService, ServiceHandle};
