//! # Connectivity provider.
//!
//! Tracks the device's connection status and serves six requirements:
//!
//! | Requirement            | Legal value                               | Met when                           |
//! |------------------------|-------------------------------------------|------------------------------------|
//! | `internet`             | `true`                                    | internet connection available      |
//! | `wifi`                 | `true`                                    | wifi connected and on internet     |
//! | `wan`                  | `true`                                    | wan connected, usable, on internet |
//! | `internetConfidence`   | `"none" \| "poor" \| "fair" \| "excellent"` | current level >= requested       |
//! | `wifiConfidence`       | same                                      | same                               |
//! | `wanConfidence`        | same                                      | same                               |
//!
//! ## Payload shape (bit-compatible with prior deployments)
//! ```text
//! { "isInternetConnectionAvailable": bool,
//!   "wifi":  { "state": "connected"|"disconnected", "onInternet": "yes"|"no",
//!              "networkConfidenceLevel": "none"|"poor"|"fair"|"excellent", ... },
//!   "wan" | "cellular": { "state", "onInternet", "network", "networkConfidenceLevel", ... },
//!   "wired": { ... } }
//! ```
//!
//! ## Rules
//! - `cellular` is accepted as an alias of `wan`.
//! - A wired connection is surfaced as wifi; a connected wifi wins over wired.
//! - A wan `network` of `"unusable"` counts as not available.
//! - `internetConfidence` aggregates as `max(wifiConfidence, wanConfidence)`
//!   (wired contributes through the wifi side).
//! - `unknown` is a sentinel below every requestable level, never requestable.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::activity::ActivityId;
use crate::error::ManagerError;

use super::binding::{RequirementBinding, RequirementBroadcast, RequirementEvent, RequirementKind};
use super::core::RequirementCore;
use super::provider::{Completion, RequirementProvider};

/// Ordered connection quality band.
///
/// `Unknown < None < Poor < Fair < Excellent`; `Unknown` is reported
/// externally but cannot be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// No observation yet (sentinel).
    Unknown,
    /// Connected with no usable throughput estimate.
    None,
    /// Poor link quality.
    Poor,
    /// Fair link quality.
    Fair,
    /// Excellent link quality.
    Excellent,
}

impl Confidence {
    /// The requestable levels, lowest first.
    pub const REQUESTABLE: [Confidence; 4] = [
        Confidence::None,
        Confidence::Poor,
        Confidence::Fair,
        Confidence::Excellent,
    ];

    /// Parses a requestable level name. `"unknown"` is not requestable.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Confidence::None),
            "poor" => Some(Confidence::Poor),
            "fair" => Some(Confidence::Fair),
            "excellent" => Some(Confidence::Excellent),
            _ => None,
        }
    }

    /// External name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Unknown => "unknown",
            Confidence::None => "none",
            Confidence::Poor => "poor",
            Confidence::Fair => "fair",
            Confidence::Excellent => "excellent",
        }
    }

    /// Index into the per-level cell arrays; `None` for the sentinel.
    fn index(self) -> Option<usize> {
        match self {
            Confidence::Unknown => None,
            Confidence::None => Some(0),
            Confidence::Poor => Some(1),
            Confidence::Fair => Some(2),
            Confidence::Excellent => Some(3),
        }
    }
}

/// A requirement core plus the activities bound to it.
struct Cell {
    core: RequirementCore,
    bound: Vec<ActivityId>,
}

impl Cell {
    fn new(name: &'static str) -> Self {
        Self {
            core: RequirementCore::new(name),
            bound: Vec::new(),
        }
    }

    fn push_event(&self, out: &mut Vec<RequirementBroadcast>, event: RequirementEvent) {
        for &activity in &self.bound {
            out.push(RequirementBroadcast {
                activity,
                requirement: self.core.name(),
                event,
            });
        }
    }

    fn unlink(&mut self, activity: ActivityId) {
        self.bound.retain(|&id| id != activity);
    }
}

/// Connectivity requirement provider.
pub struct ConnectivityProvider {
    enabled: bool,

    internet: Cell,
    wifi: Cell,
    wan: Cell,

    // One core per requestable level, each with its own binding list.
    internet_conf: [Cell; 4],
    wifi_conf: [Cell; 4],
    wan_conf: [Cell; 4],

    internet_confidence: Confidence,
    wifi_confidence: Confidence,
    wan_confidence: Confidence,
}

impl ConnectivityProvider {
    /// Creates the provider with every condition unmet and unknown.
    pub fn new() -> Self {
        Self {
            enabled: false,
            internet: Cell::new("internet"),
            wifi: Cell::new("wifi"),
            wan: Cell::new("wan"),
            internet_conf: std::array::from_fn(|_| Cell::new("internetConfidence")),
            wifi_conf: std::array::from_fn(|_| Cell::new("wifiConfidence")),
            wan_conf: std::array::from_fn(|_| Cell::new("wanConfidence")),
            internet_confidence: Confidence::Unknown,
            wifi_confidence: Confidence::Unknown,
            wan_confidence: Confidence::Unknown,
        }
    }

    fn bind_bool(
        cell: &mut Cell,
        activity: ActivityId,
        name: &str,
        value: &Value,
    ) -> Result<RequirementBinding, ManagerError> {
        if value != &Value::Bool(true) {
            return Err(ManagerError::validation(format!(
                "if a '{name}' requirement is specified, the only legal value is 'true'"
            )));
        }

        cell.bound.push(activity);
        Ok(RequirementBinding {
            name: name.to_string(),
            value: value.clone(),
            kind: RequirementKind::Boolean,
            met: cell.core.is_met(),
        })
    }

    fn bind_confidence(
        cells: &mut [Cell; 4],
        activity: ActivityId,
        name: &str,
        value: &Value,
    ) -> Result<RequirementBinding, ManagerError> {
        let level = value
            .as_str()
            .and_then(Confidence::from_name)
            .ok_or_else(|| {
                ManagerError::validation("invalid connection confidence level specified")
            })?;
        let Some(index) = level.index() else {
            return Err(ManagerError::validation(
                "invalid connection confidence level specified",
            ));
        };

        let cell = &mut cells[index];
        cell.bound.push(activity);
        Ok(RequirementBinding {
            name: name.to_string(),
            value: value.clone(),
            kind: RequirementKind::EnumLevel { level },
            met: cell.core.is_met(),
        })
    }

    /// Applies one status payload, collecting transitions in commit order.
    fn update(&mut self, response: &Value) -> Vec<RequirementBroadcast> {
        let mut out = Vec::new();

        let internet_available = response
            .get("isInternetConnectionAvailable")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // Pre-process the raw payload into the legacy shape: "cellular" is an
        // alias of "wan", and a wired connection is surfaced as wifi unless a
        // connected wifi is also present.
        let wan = response.get("wan").or_else(|| response.get("cellular"));
        let wifi = response.get("wifi");
        let wired = response.get("wired");
        let wifi_connected = wifi
            .and_then(|w| w.get("state"))
            .and_then(Value::as_str)
            == Some("connected");
        let effective_wifi = match (wifi, wired) {
            (Some(w), None) => Some(w),
            (Some(w), Some(_)) if wifi_connected => Some(w),
            (_, Some(wd)) => Some(wd),
            (None, None) => None,
        };

        let mut internet_value = Map::new();
        internet_value.insert(
            "isInternetConnectionAvailable".to_string(),
            Value::Bool(internet_available),
        );
        if let Some(wan) = wan {
            internet_value.insert("wan".to_string(), wan.clone());
        }
        if let Some(wifi) = effective_wifi {
            internet_value.insert("wifi".to_string(), wifi.clone());
        }

        let updated = self
            .internet
            .core
            .set_current_value(Value::Object(internet_value));
        if internet_available {
            if !self.internet.core.is_met() {
                debug!("internet connection is now available");
                self.internet.core.met();
                self.internet.push_event(&mut out, RequirementEvent::Met);
            } else if updated {
                self.internet.push_event(&mut out, RequirementEvent::Updated);
            }
        } else if self.internet.core.is_met() {
            debug!("internet connection is no longer available");
            self.internet.core.unmet();
            self.internet.push_event(&mut out, RequirementEvent::Unmet);
        }

        self.update_wifi(effective_wifi, &mut out);
        self.update_wan(wan, &mut out);

        let aggregate = self.wifi_confidence.max(self.wan_confidence);
        if self.internet_confidence != aggregate {
            self.internet_confidence = aggregate;
            debug!(level = aggregate.as_str(), "internet confidence level changed");
            update_confidence(&mut self.internet_conf, aggregate, &mut out);
        }

        out
    }

    fn update_wifi(&mut self, wifi: Option<&Value>, out: &mut Vec<RequirementBroadcast>) {
        let mut available = false;
        let mut confidence = Confidence::Unknown;
        let mut updated = false;

        if let Some(wifi) = wifi {
            updated = self.wifi.core.set_current_value(wifi.clone());

            match wifi.get("state").and_then(Value::as_str) {
                None => warn!("wifi connection status not present in connectivity update"),
                Some("connected") => {
                    if wifi.get("onInternet").and_then(Value::as_str) == Some("yes") {
                        available = true;
                        confidence = read_confidence(wifi);
                    }
                }
                Some(_) => {}
            }
        } else {
            warn!("wifi status not present in connectivity update");
        }

        if available {
            if !self.wifi.core.is_met() {
                debug!("wifi connection is now available");
                self.wifi.core.met();
                self.wifi.push_event(out, RequirementEvent::Met);
            } else if updated {
                self.wifi.push_event(out, RequirementEvent::Updated);
            }
        } else if self.wifi.core.is_met() {
            debug!("wifi connection is no longer available");
            self.wifi.core.unmet();
            self.wifi.push_event(out, RequirementEvent::Unmet);
        }

        if self.wifi_confidence != confidence {
            self.wifi_confidence = confidence;
            debug!(level = confidence.as_str(), "wifi confidence level changed");
            update_confidence(&mut self.wifi_conf, confidence, out);
        }
    }

    fn update_wan(&mut self, wan: Option<&Value>, out: &mut Vec<RequirementBroadcast>) {
        let mut available = false;
        let mut confidence = Confidence::Unknown;
        let mut updated = false;

        if let Some(wan) = wan {
            updated = self.wan.core.set_current_value(wan.clone());

            match wan.get("state").and_then(Value::as_str) {
                None => warn!("wan connection status not present in connectivity update"),
                Some("connected") => match wan.get("network").and_then(Value::as_str) {
                    None => warn!("wan network mode not present in connectivity update"),
                    // "unusable" means wan is up but blocked (e.g. by a call).
                    Some("unusable") => {}
                    Some(_) => {
                        if wan.get("onInternet").and_then(Value::as_str) == Some("yes") {
                            available = true;
                            confidence = read_confidence(wan);
                        }
                    }
                },
                Some(_) => {}
            }
        }

        if available {
            if !self.wan.core.is_met() {
                debug!("wan connection is now available");
                self.wan.core.met();
                self.wan.push_event(out, RequirementEvent::Met);
            } else if updated {
                self.wan.push_event(out, RequirementEvent::Updated);
            }
        } else if self.wan.core.is_met() {
            debug!("wan connection is no longer available");
            self.wan.core.unmet();
            self.wan.push_event(out, RequirementEvent::Unmet);
        }

        if self.wan_confidence != confidence {
            self.wan_confidence = confidence;
            debug!(level = confidence.as_str(), "wan confidence level changed");
            update_confidence(&mut self.wan_conf, confidence, out);
        }
    }
}

impl Default for ConnectivityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RequirementProvider for ConnectivityProvider {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn provided(&self) -> &'static [&'static str] {
        &[
            "internet",
            "wifi",
            "wan",
            "internetConfidence",
            "wifiConfidence",
            "wanConfidence",
        ]
    }

    fn enable(&mut self) {
        debug!("enabling connectivity provider");
        self.enabled = true;
    }

    fn disable(&mut self) {
        debug!("disabling connectivity provider");
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn instantiate(
        &mut self,
        activity: ActivityId,
        name: &str,
        value: &Value,
    ) -> Result<RequirementBinding, ManagerError> {
        debug!(requirement = name, activity, "instantiating requirement");

        match name {
            "internet" => Self::bind_bool(&mut self.internet, activity, name, value),
            "wifi" => Self::bind_bool(&mut self.wifi, activity, name, value),
            "wan" => Self::bind_bool(&mut self.wan, activity, name, value),
            "internetConfidence" => {
                Self::bind_confidence(&mut self.internet_conf, activity, name, value)
            }
            "wifiConfidence" => Self::bind_confidence(&mut self.wifi_conf, activity, name, value),
            "wanConfidence" => Self::bind_confidence(&mut self.wan_conf, activity, name, value),
            _ => Err(ManagerError::UnknownRequirement {
                name: name.to_string(),
            }),
        }
    }

    fn unlink(&mut self, activity: ActivityId) {
        self.internet.unlink(activity);
        self.wifi.unlink(activity);
        self.wan.unlink(activity);
        for cell in self
            .internet_conf
            .iter_mut()
            .chain(self.wifi_conf.iter_mut())
            .chain(self.wan_conf.iter_mut())
        {
            cell.unlink(activity);
        }
    }

    fn ingest(&mut self, completion: Completion) -> Vec<RequirementBroadcast> {
        match completion {
            Completion::Ok(payload) => {
                if !self.enabled {
                    return Vec::new();
                }
                self.update(&payload)
            }
            Completion::TransientError(reason) => {
                warn!(%reason, "connectivity subscription failed, resubscribing");
                Vec::new()
            }
            Completion::PermanentError(reason) => {
                warn!(
                    %reason,
                    "connectivity subscription experienced an uncorrectable failure"
                );
                self.enabled = false;
                Vec::new()
            }
        }
    }

    fn snapshot(&self) -> Value {
        json!({
            "enabled": self.enabled,
            "internetAvailable": self.internet.core.is_met(),
            "wifiAvailable": self.wifi.core.is_met(),
            "wanAvailable": self.wan.core.is_met(),
            "internetConfidence": self.internet_confidence.as_str(),
            "wifiConfidence": self.wifi_confidence.as_str(),
            "wanConfidence": self.wan_confidence.as_str(),
        })
    }
}

/// Reads `networkConfidenceLevel` from a connection description.
fn read_confidence(spec: &Value) -> Confidence {
    let Some(level) = spec.get("networkConfidenceLevel") else {
        warn!("network confidence not present in connection description");
        return Confidence::Unknown;
    };
    let Some(level) = level.as_str() else {
        warn!("network confidence must be specified as a string");
        return Confidence::Unknown;
    };
    match Confidence::from_name(level) {
        Some(confidence) => confidence,
        None => {
            debug!(level, "unknown connection confidence name");
            Confidence::Unknown
        }
    }
}

/// Walks every per-level cell after a confidence change.
///
/// Level `i` is met iff the current confidence is at least `i`; cells whose
/// met state does not flip still see the value change as `Updated`.
fn update_confidence(
    cells: &mut [Cell; 4],
    confidence: Confidence,
    out: &mut Vec<RequirementBroadcast>,
) {
    let value = Value::String(confidence.as_str().to_string());

    for (index, cell) in cells.iter_mut().enumerate() {
        cell.core.set_current_value(value.clone());

        let met_now = confidence.index().map_or(false, |current| current >= index);
        if met_now {
            if !cell.core.is_met() {
                cell.core.met();
                cell.push_event(out, RequirementEvent::Met);
            } else {
                cell.push_event(out, RequirementEvent::Updated);
            }
        } else if cell.core.is_met() {
            cell.core.unmet();
            cell.push_event(out, RequirementEvent::Unmet);
        } else {
            cell.push_event(out, RequirementEvent::Updated);
        }
    }
}
