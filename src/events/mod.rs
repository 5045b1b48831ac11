//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the activity manager, the
//! requirement providers, and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ActivityManager` (lifecycle, admission, focus, yield),
//!   provider ingestion (requirement transitions), `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumers**: `ActivityService::subscriber_listener()` (fans out to
//!   `SubscriberSet`), plus any external `Bus::subscribe()` caller.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
