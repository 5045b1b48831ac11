//! The nine run queues.
//!
//! Queues hold activity **ids** in FIFO order; the owning activity records
//! its queue in `current_queue`. The manager is the only writer and keeps
//! both sides consistent: an activity is on at most one queue at any
//! observable moment.

use std::collections::VecDeque;

use crate::activity::ActivityId;

/// Names of the run queues, exactly as externally observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    /// Registered, not yet permitted to schedule.
    Initialized,
    /// Waiting for requirements, trigger, and schedule time.
    Scheduled,
    /// Runnable, waiting for a background slot.
    Ready,
    /// Runnable user-interactive work, admitted ahead of plain background.
    ReadyInteractive,
    /// Running under the background concurrency cap.
    Background,
    /// Running under the interactive concurrency cap.
    BackgroundInteractive,
    /// Long-running background work evicted from the counted queue.
    LongBackground,
    /// Running without concurrency gating.
    Immediate,
    /// Terminal parking.
    Ended,
}

impl QueueName {
    /// All queues, in listing order.
    pub const ALL: [QueueName; 9] = [
        QueueName::Initialized,
        QueueName::Scheduled,
        QueueName::Ready,
        QueueName::ReadyInteractive,
        QueueName::Background,
        QueueName::BackgroundInteractive,
        QueueName::LongBackground,
        QueueName::Immediate,
        QueueName::Ended,
    ];

    /// Stable external name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Initialized => "initialized",
            QueueName::Scheduled => "scheduled",
            QueueName::Ready => "ready",
            QueueName::ReadyInteractive => "readyInteractive",
            QueueName::Background => "background",
            QueueName::BackgroundInteractive => "backgroundInteractive",
            QueueName::LongBackground => "longBackground",
            QueueName::Immediate => "immediate",
            QueueName::Ended => "ended",
        }
    }

    fn index(self) -> usize {
        match self {
            QueueName::Initialized => 0,
            QueueName::Scheduled => 1,
            QueueName::Ready => 2,
            QueueName::ReadyInteractive => 3,
            QueueName::Background => 4,
            QueueName::BackgroundInteractive => 5,
            QueueName::LongBackground => 6,
            QueueName::Immediate => 7,
            QueueName::Ended => 8,
        }
    }
}

/// The nine ordered id sequences.
#[derive(Debug)]
pub(crate) struct QueueSet {
    queues: [VecDeque<ActivityId>; 9],
}

impl QueueSet {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    pub fn push_back(&mut self, queue: QueueName, id: ActivityId) {
        self.queues[queue.index()].push_back(id);
    }

    pub fn front(&self, queue: QueueName) -> Option<ActivityId> {
        self.queues[queue.index()].front().copied()
    }

    /// Removes `id` from `queue`; returns whether it was present.
    pub fn remove(&mut self, queue: QueueName, id: ActivityId) -> bool {
        let q = &mut self.queues[queue.index()];
        if let Some(position) = q.iter().position(|&entry| entry == id) {
            q.remove(position);
            true
        } else {
            false
        }
    }

    pub fn len(&self, queue: QueueName) -> usize {
        self.queues[queue.index()].len()
    }

    pub fn is_empty(&self, queue: QueueName) -> bool {
        self.queues[queue.index()].is_empty()
    }

    pub fn iter(&self, queue: QueueName) -> impl Iterator<Item = ActivityId> + '_ {
        self.queues[queue.index()].iter().copied()
    }
}
