//! Bus command surface and wire-level outcomes.

use serde::Serialize;
use serde_json::Value;

use crate::activity::{ActivityDefinition, ActivityId, BusId};
use crate::error::{ErrorCode, ManagerError};
use crate::requirements::Completion;

/// One command against the manager, as submitted over the bus.
#[derive(Debug)]
pub enum Command {
    /// Accept a definition and register the activity.
    Create { definition: ActivityDefinition },
    /// Parent drops the activity.
    Release { id: ActivityId },
    /// Begin (or resume) the lifecycle.
    Start { id: ActivityId },
    /// Graceful end.
    Stop { id: ActivityId },
    /// Forced end from any state.
    Cancel { id: ActivityId },
    /// Park until the next start.
    Pause { id: ActivityId },
    /// The work finished; continuous activities restart.
    Complete { id: ActivityId },
    /// Ask a running interactive activity to wind down.
    Yield { id: ActivityId },
    /// Exclusive focus.
    Focus { id: ActivityId },
    /// Remove focus.
    Unfocus { id: ActivityId },
    /// Additive focus from a focused source.
    AddFocus {
        source: ActivityId,
        target: ActivityId,
    },
    /// A subscriber joins the activity.
    Adopt { id: ActivityId, subscriber: BusId },
    /// A subscriber departs.
    Unsubscribe { id: ActivityId, subscriber: BusId },
    /// Queue listing plus the leaked set.
    List,
    /// Full record for one activity.
    GetDetails { id: ActivityId },
    /// Set manager enable bits.
    Enable { mask: u8 },
    /// Clear manager enable bits.
    Disable { mask: u8 },
    /// Route an upstream completion to a provider.
    ProviderUpdate {
        provider: String,
        completion: Completion,
    },
    /// Feed a trigger stream update to an activity.
    TriggerUpdate { id: ActivityId, payload: Value },
}

impl Command {
    /// Short stable label for logs/metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Release { .. } => "release",
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::Cancel { .. } => "cancel",
            Command::Pause { .. } => "pause",
            Command::Complete { .. } => "complete",
            Command::Yield { .. } => "yield",
            Command::Focus { .. } => "focus",
            Command::Unfocus { .. } => "unfocus",
            Command::AddFocus { .. } => "addFocus",
            Command::Adopt { .. } => "adopt",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::List => "list",
            Command::GetDetails { .. } => "getDetails",
            Command::Enable { .. } => "enable",
            Command::Disable { .. } => "disable",
            Command::ProviderUpdate { .. } => "providerUpdate",
            Command::TriggerUpdate { .. } => "triggerUpdate",
        }
    }
}

/// Wire-level command outcome: `{ok, errorCode?, errorText?, ...payload}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Error code for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Command-specific reply fields.
    #[serde(flatten)]
    pub payload: Option<Value>,
}

impl From<Result<Value, ManagerError>> for CommandOutcome {
    fn from(result: Result<Value, ManagerError>) -> Self {
        match result {
            Ok(value) => CommandOutcome {
                ok: true,
                error_code: None,
                error_text: None,
                payload: if value.is_null() { None } else { Some(value) },
            },
            Err(err) => CommandOutcome {
                ok: false,
                error_code: Some(err.code()),
                error_text: Some(err.to_string()),
                payload: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_outcome_flattens_the_payload() {
        let outcome = CommandOutcome::from(Ok(json!({"activityId": 12})));
        let encoded = serde_json::to_value(&outcome).expect("encode");
        assert_eq!(encoded, json!({"ok": true, "activityId": 12}));
    }

    #[test]
    fn failure_outcome_carries_code_and_text() {
        let outcome = CommandOutcome::from(Err(ManagerError::NoSuchActivity { id: 9 }));
        let encoded = serde_json::to_value(&outcome).expect("encode");
        assert_eq!(encoded["ok"], json!(false));
        assert_eq!(encoded["errorCode"], json!("NotFound"));
    }
}
