//! # Event subscribers for the activisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out used to deliver runtime events broadcast through the
//! [`Bus`](crate::events::Bus) to external observers.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ActivityManager ── publish(Event) ──► Bus ──► service listener
//!                                                    │
//!                                                    ▼
//!                                              SubscriberSet
//!                                              ├──► [queue S1] ─► worker ─► on_event()
//!                                              ├──► [queue S2] ─► worker ─► on_event()
//!                                              └──► [queue SN] ─► worker ─► on_event()
//! ```
//!
//! ## Rules
//! - Slow subscribers only affect themselves (queue overflow → event drop)
//! - Panics are **isolated** (do not crash the service or other subscribers)
//! - Subscribers **do not block** publishers or other subscribers
//! - Queue capacity is **per-subscriber** (not global)

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
