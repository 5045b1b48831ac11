//! # Declarative predicate matching over JSON-shaped payloads.
//!
//! A trigger's `where` clause is data, not code: nested objects of `and`,
//! `or`, and `{prop, op, val}` comparisons. [`WhereMatcher`] validates the
//! clause once at construction and then evaluates payloads against it.
//!
//! ## Contents
//! - [`WhereMatcher`] compiled predicate; pure evaluation
//! - [`MatchResult`] tri-state outcome (`NoProperty` is distinct from a
//!   plain non-match so triggers can ignore uninteresting updates)
//! - [`MatcherError`] construction-time grammar failures
//!
//! ## Rules
//! - Validation happens **once**, in [`WhereMatcher::new`]; evaluation never
//!   reports grammar errors.
//! - Descending into an array splits evaluation: **all** elements must match
//!   in `and`-mode, **at least one** in `or`-mode, recursively (arrays of
//!   arrays iterate all the way down).
//! - Comparisons use structural ordering (see [`value_cmp`]).

mod ordering;
mod where_matcher;

pub use ordering::value_cmp;
pub use where_matcher::{MatchResult, MatcherError, WhereMatcher};
