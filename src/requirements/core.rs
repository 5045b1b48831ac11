//! Provider-owned requirement cell.

use serde_json::Value;

/// The authoritative `(name, currentValue, isMet)` cell for one condition.
///
/// Bindings read from it; only the owning provider mutates it.
#[derive(Debug, Clone)]
pub struct RequirementCore {
    name: &'static str,
    current: Value,
    met: bool,
}

impl RequirementCore {
    /// Creates an unmet core with no observed value yet.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Value::Null,
            met: false,
        }
    }

    /// Requirement name this core backs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last value committed by the provider.
    pub fn current_value(&self) -> &Value {
        &self.current
    }

    /// Whether the condition currently holds.
    pub fn is_met(&self) -> bool {
        self.met
    }

    /// Commits a new observed value.
    ///
    /// Returns `true` if the value actually changed, so the provider can
    /// decide between an `Updated` broadcast and silence.
    pub fn set_current_value(&mut self, value: Value) -> bool {
        if self.current == value {
            return false;
        }
        self.current = value;
        true
    }

    /// Marks the condition met.
    pub fn met(&mut self) {
        self.met = true;
    }

    /// Marks the condition unmet.
    pub fn unmet(&mut self) {
        self.met = false;
    }
}
