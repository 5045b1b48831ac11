//! # Error types used by the activisor runtime.
//!
//! This module defines the error surface of the manager:
//!
//! - [`ManagerError`] errors raised by commands and definition handling.
//! - [`ErrorCode`] the externally observable code set returned on the bus.
//!
//! [`ManagerError`] provides `as_label()` for logs/metrics and `code()` for
//! mapping onto the wire-level [`ErrorCode`].

use serde::Serialize;
use thiserror::Error;

use crate::activity::ActivityId;

/// # Errors produced by manager commands and definition handling.
///
/// Validation and conflict errors propagate to the caller of the command that
/// triggered them; they never leave the manager in a modified state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Malformed definition, predicate, or command argument.
    #[error("invalid argument: {reason}")]
    Validation {
        /// Human-readable description of what failed to validate.
        reason: String,
    },

    /// Command is not applicable to the activity's current state.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What the command expected and what it found.
        reason: String,
    },

    /// Attempted to register a `(creator, name)` pair that is already live.
    #[error("activity \"{name}\" is already registered for creator {creator}")]
    NameConflict {
        /// The duplicate activity name.
        name: String,
        /// Formatted creator identity.
        creator: String,
    },

    /// Attempted to force-allocate an id that is already live.
    #[error("activity id {id} is already registered")]
    IdConflict {
        /// The duplicate id.
        id: ActivityId,
    },

    /// Lookup by id found nothing.
    #[error("activity {id} not found")]
    NoSuchActivity {
        /// The missing id.
        id: ActivityId,
    },

    /// Lookup by `(name, creator)` found nothing.
    #[error("activity \"{name}\" not found for creator {creator}")]
    NoSuchName {
        /// The missing activity name.
        name: String,
        /// Formatted creator identity.
        creator: String,
    },

    /// A requirement name no registered provider recognizes.
    #[error("unknown requirement \"{name}\"")]
    UnknownRequirement {
        /// The unrecognized requirement name.
        name: String,
    },

    /// The service actor is gone (channel closed).
    #[error("activity service is not running")]
    ServiceClosed,

    /// Inconsistency the manager could not attribute to caller input.
    #[error("internal error: {reason}")]
    Internal {
        /// Context for the log line.
        reason: String,
    },
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::Validation { .. } => "validation",
            ManagerError::InvalidState { .. } => "invalid_state",
            ManagerError::NameConflict { .. } => "name_conflict",
            ManagerError::IdConflict { .. } => "id_conflict",
            ManagerError::NoSuchActivity { .. } => "no_such_activity",
            ManagerError::NoSuchName { .. } => "no_such_name",
            ManagerError::UnknownRequirement { .. } => "unknown_requirement",
            ManagerError::ServiceClosed => "service_closed",
            ManagerError::Internal { .. } => "internal",
        }
    }

    /// Maps the error onto the externally observable code set.
    pub fn code(&self) -> ErrorCode {
        match self {
            ManagerError::Validation { .. }
            | ManagerError::InvalidState { .. }
            | ManagerError::UnknownRequirement { .. } => ErrorCode::InvalidArg,
            ManagerError::NameConflict { .. } | ManagerError::IdConflict { .. } => {
                ErrorCode::AlreadyRegistered
            }
            ManagerError::NoSuchActivity { .. } | ManagerError::NoSuchName { .. } => {
                ErrorCode::NotFound
            }
            ManagerError::ServiceClosed | ManagerError::Internal { .. } => ErrorCode::Unknown,
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        ManagerError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        ManagerError::InvalidState {
            reason: reason.into(),
        }
    }
}

/// Wire-level error codes returned in command outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Command succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// Malformed or inapplicable argument.
    InvalidArg,
    /// Unknown id or `(creator, name)` pair.
    NotFound,
    /// Duplicate id or `(creator, name)` pair.
    AlreadyRegistered,
    /// Anything the manager cannot attribute to the caller.
    Unknown,
}

impl ErrorCode {
    /// Stable string form used on the bus.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::InvalidArg => "InvalidArg",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::AlreadyRegistered => "AlreadyRegistered",
            ErrorCode::Unknown => "Unknown",
        }
    }
}
