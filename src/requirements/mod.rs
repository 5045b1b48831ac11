//! # Named preconditions supplied by external providers.
//!
//! A *requirement* is a named boolean condition an activity declares in its
//! definition (`"internet": true`, `"wifiConfidence": "fair"`). Providers are
//! the authoritative sources: each owns one [`RequirementCore`] per condition
//! it tracks, mutates it on upstream updates, and broadcasts met/unmet
//! transitions to every live binding.
//!
//! ## Contents
//! - [`RequirementCore`] provider-owned `(name, currentValue, isMet)` cell
//! - [`RequirementBinding`] per-activity binding with the last observed state
//! - [`RequirementEvent`] / [`RequirementBroadcast`] transition deliveries
//! - [`RequirementProvider`] the provider contract
//! - [`ProviderRegistry`] requirement name → provider routing
//! - [`ConnectivityProvider`] connectivity conditions (`internet`, `wifi`,
//!   `wan` and their confidence levels)
//!
//! ## Rules
//! - Only the owning provider mutates a core.
//! - Broadcasts are delivered in the order the provider committed them; a
//!   `Met`/`Unmet` for an underlying change precedes any `Updated` for the
//!   same change.
//! - Bindings hold activity **ids**, never activity references; the scheduler
//!   re-resolves on each delivery and tolerates ids that are gone.

mod binding;
mod connectivity;
mod core;
mod provider;
mod registry;

pub use self::core::RequirementCore;
pub use binding::{RequirementBinding, RequirementBroadcast, RequirementEvent, RequirementKind};
pub use connectivity::{Confidence, ConnectivityProvider};
pub use provider::{Completion, RequirementProvider};
pub use registry::{IngestOutcome, ProviderRegistry};
