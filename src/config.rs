//! # Global manager configuration.
//!
//! [`ManagerConfig`] defines the scheduler's behavior: background concurrency
//! levels, the interactive yield timeout, event bus capacity, the initial
//! enable mask, and the optional persistence path.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use activisor::{Concurrency, ManagerConfig};
//!
//! let mut cfg = ManagerConfig::default();
//! cfg.background_concurrency = Concurrency::Limited(2);
//! cfg.yield_timeout = Duration::from_secs(2);
//!
//! assert!(cfg.background_concurrency.admits(1));
//! assert!(!cfg.background_concurrency.admits(2));
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Concurrency cap for a pair of running queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// At most this many activities run at once.
    Limited(u32),
    /// No cap; every ready activity is admitted.
    Unlimited,
}

impl Concurrency {
    /// True if one more activity may run given the current running count.
    pub fn admits(&self, running: usize) -> bool {
        match self {
            Concurrency::Limited(level) => running < *level as usize,
            Concurrency::Unlimited => true,
        }
    }
}

/// Scheduling is permitted only when all mask bits are set.
pub mod enable {
    /// External controller has enabled scheduling.
    pub const EXTERNAL: u8 = 1 << 0;
    /// Device UI is up.
    pub const UI: u8 = 1 << 1;
    /// All known bits.
    pub const MASK: u8 = EXTERNAL | UI;
}

/// Global configuration for the activity manager and its service loop.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cap on `|background| + |backgroundInteractive|` for plain admissions.
    pub background_concurrency: Concurrency,
    /// Cap on the same sum for interactive admissions.
    pub background_interactive_concurrency: Concurrency,
    /// How long a waiting interactive activity is allowed to starve before a
    /// running one is asked to yield.
    pub yield_timeout: Duration,
    /// Enable bits the manager starts with (see [`enable`]).
    pub initial_enable_mask: u8,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Capacity of the service command queue.
    pub command_queue_capacity: usize,
    /// Where persistent activity definitions are saved on shutdown.
    /// `None` disables persistence.
    pub persist_path: Option<PathBuf>,
}

impl Default for ManagerConfig {
    /// Provides the device defaults:
    /// - `background_concurrency = Limited(1)`
    /// - `background_interactive_concurrency = Limited(3)`
    /// - `yield_timeout = 60s`
    /// - `initial_enable_mask = EXTERNAL | UI`
    /// - `bus_capacity = 1024`
    /// - `command_queue_capacity = 256`
    /// - `persist_path = None`
    fn default() -> Self {
        Self {
            background_concurrency: Concurrency::Limited(1),
            background_interactive_concurrency: Concurrency::Limited(3),
            yield_timeout: Duration::from_secs(60),
            initial_enable_mask: enable::MASK,
            bus_capacity: 1024,
            command_queue_capacity: 256,
            persist_path: None,
        }
    }
}
