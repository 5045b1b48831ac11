//! Provider contract and upstream completion type.

use serde_json::Value;

use crate::activity::ActivityId;
use crate::error::ManagerError;

use super::binding::{RequirementBinding, RequirementBroadcast};

/// Outcome of one upstream call or subscription delivery.
///
/// The transport layer (message bus, poller, test harness) classifies
/// failures; the provider only reacts to the classification.
#[derive(Debug, Clone)]
pub enum Completion {
    /// A payload arrived.
    Ok(Value),
    /// The subscription dropped but may recover; the transport re-subscribes.
    TransientError(String),
    /// The upstream reported a fatal condition; the provider disables itself
    /// and bound requirements keep their last-known state.
    PermanentError(String),
}

/// A named source of one or more requirements.
///
/// Providers are registered with the [`ProviderRegistry`](super::ProviderRegistry)
/// under every requirement name they serve. All calls run on the manager's
/// event loop; a provider never touches activities directly, it returns
/// [`RequirementBroadcast`]s and the scheduler applies them.
pub trait RequirementProvider: Send {
    /// Provider name (for logs and registry bookkeeping).
    fn name(&self) -> &'static str;

    /// Requirement names this provider serves.
    fn provided(&self) -> &'static [&'static str];

    /// Connects the provider to its upstream source.
    fn enable(&mut self);

    /// Disconnects from the upstream source. Bound requirements keep their
    /// last-known state.
    fn disable(&mut self);

    /// Whether the provider is currently enabled.
    fn is_enabled(&self) -> bool;

    /// Creates a binding of `name` with the requested comparison `value` for
    /// `activity`, recording the activity in the broadcast list.
    ///
    /// Fails with a validation error when the value is not legal for the
    /// requirement.
    fn instantiate(
        &mut self,
        activity: ActivityId,
        name: &str,
        value: &Value,
    ) -> Result<RequirementBinding, ManagerError>;

    /// Drops `activity` from every broadcast list (activity released).
    fn unlink(&mut self, activity: ActivityId);

    /// Feeds one upstream completion through the provider.
    ///
    /// Returns the transitions to deliver, in commit order: for any single
    /// underlying change, `Met`/`Unmet` deliveries precede `Updated` ones.
    fn ingest(&mut self, completion: Completion) -> Vec<RequirementBroadcast>;

    /// Current provider state for introspection.
    fn snapshot(&self) -> Value {
        Value::Null
    }
}
