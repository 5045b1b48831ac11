//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [created] activity=12 name=backup
//! [ready] activity=12
//! [running] activity=12 queue=background
//! [yield-requested] activity=12
//! [requirement-met] activity=12 requirement=internet
//! [ended] activity=12
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Not intended for production use -
/// implement a custom [`Subscribe`] for structured logging or metrics.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tag = match e.kind {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::ActivityCreated => "created",
            EventKind::ActivityScheduled => "scheduled",
            EventKind::ActivityReady => "ready",
            EventKind::ActivityNotReady => "not-ready",
            EventKind::ActivityRunning => "running",
            EventKind::ActivityPaused => "paused",
            EventKind::ActivityEnding => "ending",
            EventKind::ActivityEnded => "ended",
            EventKind::ActivityRestarted => "restarted",
            EventKind::ActivityReleased => "released",
            EventKind::ActivityYieldRequested => "yield-requested",
            EventKind::FocusGained => "focus-gained",
            EventKind::FocusLost => "focus-lost",
            EventKind::RequirementMet => "requirement-met",
            EventKind::RequirementUnmet => "requirement-unmet",
            EventKind::RequirementUpdated => "requirement-updated",
            EventKind::TriggerFired => "trigger-fired",
            EventKind::ProviderDisabled => "provider-disabled",
            EventKind::CommandRejected => "command-rejected",
        };

        let mut line = format!("[{tag}]");
        if let Some(id) = e.activity {
            line.push_str(&format!(" activity={id}"));
        }
        if let Some(name) = &e.name {
            line.push_str(&format!(" name={name}"));
        }
        if let Some(queue) = e.queue {
            line.push_str(&format!(" queue={queue}"));
        }
        if let Some(req) = &e.requirement {
            line.push_str(&format!(" requirement={req}"));
        }
        if let Some(reason) = &e.reason {
            line.push_str(&format!(" reason={reason:?}"));
        }
        println!("{line}");
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
