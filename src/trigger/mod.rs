//! # Trigger: a provider event stream filtered through a predicate.
//!
//! A trigger subscribes an activity to a bus method and fires when an update
//! from that stream satisfies the `where` clause. Once fired it stays fired
//! until an explicit re-arm, so a transient condition still releases the
//! activity it was gating.
//!
//! ## Rules
//! - No `where` clause means any update fires the trigger.
//! - `NoProperty` results are uninteresting updates and never fire.
//! - Restart policies re-arm the trigger (fired is cleared).

use serde_json::Value;
use tracing::debug;

use crate::error::ManagerError;
use crate::matcher::{MatchResult, WhereMatcher};

/// Subscription of one activity to a filtered provider stream.
#[derive(Debug, Clone)]
pub struct Trigger {
    method: String,
    params: Value,
    matcher: Option<WhereMatcher>,
    armed: bool,
    fired: bool,
}

impl Trigger {
    /// Builds a trigger, validating the `where` clause if present.
    pub fn new(
        method: impl Into<String>,
        params: Option<Value>,
        where_clause: Option<Value>,
    ) -> Result<Self, ManagerError> {
        let matcher = match where_clause {
            Some(clause) => Some(
                WhereMatcher::new(clause)
                    .map_err(|err| ManagerError::validation(err.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            method: method.into(),
            params: params.unwrap_or(Value::Null),
            matcher,
            armed: true,
            fired: false,
        })
    }

    /// Bus address of the subscribed stream.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Subscription parameters.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// The predicate, if any (introspection).
    pub fn where_clause(&self) -> Option<&Value> {
        self.matcher.as_ref().map(WhereMatcher::clause)
    }

    /// Whether the subscription is active.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether the trigger has fired since the last re-arm.
    pub fn is_fired(&self) -> bool {
        self.fired
    }

    /// Feeds one stream update; returns `true` if the trigger fired on it.
    pub fn deliver(&mut self, response: &Value) -> bool {
        if !self.armed || self.fired {
            return false;
        }

        let result = match &self.matcher {
            Some(matcher) => matcher.evaluate(response),
            None => MatchResult::Matched,
        };

        match result {
            MatchResult::Matched => {
                debug!(method = %self.method, "trigger fired");
                self.fired = true;
                true
            }
            // NoProperty: the update does not talk about the property at all.
            MatchResult::NotMatched | MatchResult::NoProperty => false,
        }
    }

    /// Clears fired state and resumes watching the stream.
    pub fn rearm(&mut self) {
        self.fired = false;
        self.armed = true;
    }

    /// Stops watching the stream (activity is ending).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}
