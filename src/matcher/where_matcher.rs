//! Compiled `where` clause: validation and tri-state evaluation.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::ordering::value_cmp;

/// Outcome of evaluating a clause against a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The payload satisfies the clause.
    Matched,
    /// The payload was inspected and does not satisfy the clause.
    NotMatched,
    /// A property named by the clause is absent from the payload.
    ///
    /// Treated as a non-match, but reported distinctly so triggers can skip
    /// updates that do not talk about the property at all.
    NoProperty,
}

/// Grammar failures reported at construction time.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// The top-level statement is neither a clause nor an array of clauses.
    #[error("where statement should consist of a single clause or array of valid clauses")]
    MalformedStatement,

    /// A clause carries none of `and`, `or`, or a property comparison.
    #[error("each where clause must contain \"or\", \"and\", or a \"prop\" to compare against")]
    MissingComparison,

    /// A clause mixes `and`, `or`, and/or a property comparison.
    #[error(
        "only one of \"and\", \"or\", or a valid clause including \"prop\", \
         \"op\", and a \"val\" to compare against may be present in a clause"
    )]
    MixedClause,

    /// A property key is neither a string nor an array of strings.
    #[error("property keys must be specified as a property name, or array of property names")]
    BadKey,

    /// A comparison names an unknown operation.
    #[error("operation must be one of '<', '<=', '=', '>=', '>', '!=', and 'where'")]
    BadOp,

    /// A comparison is missing its `op`.
    #[error("each where clause must contain a test operation to perform")]
    MissingOp,

    /// A comparison is missing its `val`.
    #[error("each where clause must contain a value to test against")]
    MissingVal,
}

/// How an array split aggregates its element results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// Every element must match.
    All,
    /// At least one element must match.
    Any,
}

/// A validated `where` clause, ready for repeated evaluation.
///
/// Evaluation is a pure function of the clause and the payload: no state is
/// kept between calls and repeated evaluation yields the same result.
#[derive(Debug, Clone)]
pub struct WhereMatcher {
    clause: Value,
}

impl WhereMatcher {
    /// Validates the clause grammar and compiles the matcher.
    pub fn new(where_clause: Value) -> Result<Self, MatcherError> {
        validate_clauses(&where_clause)?;
        Ok(Self {
            clause: where_clause,
        })
    }

    /// The clause this matcher was built from (introspection).
    pub fn clause(&self) -> &Value {
        &self.clause
    }

    /// True if the payload satisfies the clause.
    pub fn matches(&self, response: &Value) -> bool {
        let result = self.evaluate(response);
        debug!(?result, "where clause evaluated");
        result == MatchResult::Matched
    }

    /// Evaluates the payload, preserving the tri-state result.
    pub fn evaluate(&self, response: &Value) -> MatchResult {
        check_clause(&self.clause, response, MatchMode::All)
    }
}

// ---------------------------
// Validation
// ---------------------------

fn validate_clauses(where_clause: &Value) -> Result<(), MatcherError> {
    match where_clause {
        Value::Object(_) => validate_clause(where_clause),
        Value::Array(clauses) => {
            for clause in clauses {
                if !clause.is_object() {
                    return Err(MatcherError::MalformedStatement);
                }
                validate_clause(clause)?;
            }
            Ok(())
        }
        _ => Err(MatcherError::MalformedStatement),
    }
}

fn validate_clause(clause: &Value) -> Result<(), MatcherError> {
    let mut found = false;

    if let Some(and_clauses) = clause.get("and") {
        found = true;
        validate_clauses(and_clauses)?;
    }

    if let Some(or_clauses) = clause.get("or") {
        if found {
            return Err(MatcherError::MixedClause);
        }
        found = true;
        validate_clauses(or_clauses)?;
    }

    let prop = match clause.get("prop") {
        None => {
            return if found {
                Ok(())
            } else {
                Err(MatcherError::MissingComparison)
            };
        }
        Some(_) if found => return Err(MatcherError::MixedClause),
        Some(prop) => prop,
    };

    validate_key(prop)?;

    let val = clause.get("val").ok_or(MatcherError::MissingVal)?;
    let op = clause.get("op").ok_or(MatcherError::MissingOp)?;
    validate_op(op, val)
}

fn validate_key(key: &Value) -> Result<(), MatcherError> {
    match key {
        Value::String(_) => Ok(()),
        Value::Array(parts) => {
            if parts.iter().all(Value::is_string) {
                Ok(())
            } else {
                Err(MatcherError::BadKey)
            }
        }
        _ => Err(MatcherError::BadKey),
    }
}

fn validate_op(op: &Value, val: &Value) -> Result<(), MatcherError> {
    let op = op.as_str().ok_or(MatcherError::BadOp)?;
    match op {
        "<" | "<=" | "=" | "!=" | ">=" | ">" => Ok(()),
        // A nested "where" carries a whole clause as its value.
        "where" => validate_clauses(val),
        _ => Err(MatcherError::BadOp),
    }
}

// ---------------------------
// Evaluation
// ---------------------------
//
// The grammar was validated at construction, so evaluation treats any
// malformed shape it still encounters as a plain non-match.

fn check_clauses(clauses: &Value, response: &Value, mode: MatchMode) -> MatchResult {
    let list = match clauses {
        Value::Object(_) => return check_clause(clauses, response, mode),
        Value::Array(list) => list,
        _ => return MatchResult::NotMatched,
    };

    for clause in list {
        let result = check_clause(clause, response, mode);
        match mode {
            MatchMode::All => {
                if result != MatchResult::Matched {
                    return MatchResult::NotMatched;
                }
            }
            MatchMode::Any => {
                if result == MatchResult::Matched {
                    return MatchResult::Matched;
                }
            }
        }
    }

    match mode {
        MatchMode::All => MatchResult::Matched,
        MatchMode::Any => MatchResult::NotMatched,
    }
}

fn check_clause(clause: &Value, response: &Value, mode: MatchMode) -> MatchResult {
    let obj = match clause {
        Value::Array(_) => return check_clauses(clause, response, mode),
        Value::Object(obj) => obj,
        _ => return MatchResult::NotMatched,
    };

    if let Some(and_clause) = obj.get("and") {
        return check_clauses(and_clause, response, MatchMode::All);
    }
    if let Some(or_clause) = obj.get("or") {
        return check_clauses(or_clause, response, MatchMode::Any);
    }

    let (prop, op, val) = match (obj.get("prop"), obj.get("op"), obj.get("val")) {
        (Some(prop), Some(op), Some(val)) => (prop, op, val),
        _ => return MatchResult::NotMatched,
    };

    check_property(prop, response, op, val, mode)
}

fn check_property(
    key: &Value,
    response: &Value,
    op: &Value,
    val: &Value,
    mode: MatchMode,
) -> MatchResult {
    match key {
        Value::String(name) => match response.get(name.as_str()) {
            Some(prop_val) => check_match(prop_val, op, val, mode),
            None => MatchResult::NoProperty,
        },
        Value::Array(path) => check_path(path, response, op, val, mode),
        _ => MatchResult::NoProperty,
    }
}

/// Descends a key path, splitting over arrays along the way.
fn check_path(
    path: &[Value],
    response: &Value,
    op: &Value,
    val: &Value,
    mode: MatchMode,
) -> MatchResult {
    let mut onion = response;

    for (depth, step) in path.iter().enumerate() {
        match onion {
            // Splitting recurses with the remaining path, so arrays of
            // arrays iterate all the way down.
            Value::Array(elements) => {
                return split_over(elements, mode, |element| {
                    check_path(&path[depth..], element, op, val, mode)
                });
            }
            Value::Object(obj) => {
                let name = match step.as_str() {
                    Some(name) => name,
                    None => return MatchResult::NoProperty,
                };
                match obj.get(name) {
                    Some(next) => onion = next,
                    None => return MatchResult::NoProperty,
                }
            }
            _ => return MatchResult::NoProperty,
        }
    }

    check_match(onion, op, val, mode)
}

fn check_match(rhs: &Value, op: &Value, val: &Value, mode: MatchMode) -> MatchResult {
    let op = match op.as_str() {
        Some(op) => op,
        None => return MatchResult::NotMatched,
    };

    // A nested "where" evaluates its clause with the matched subtree as the
    // response.
    if op == "where" {
        return check_clause(val, rhs, MatchMode::All);
    }

    check_leaf(rhs, op, val, mode)
}

fn check_leaf(rhs: &Value, op: &str, val: &Value, mode: MatchMode) -> MatchResult {
    // A leaf array splits element-wise unless the comparison value is itself
    // an array (then the arrays compare structurally).
    if let Value::Array(elements) = rhs {
        if !val.is_array() {
            return split_over(elements, mode, |element| check_leaf(element, op, val, mode));
        }
    }

    let ord = value_cmp(rhs, val);
    let result = match op {
        "<" => ord == Ordering::Less,
        "<=" => ord != Ordering::Greater,
        "=" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        ">=" => ord != Ordering::Less,
        ">" => ord == Ordering::Greater,
        _ => false,
    };

    if result {
        MatchResult::Matched
    } else {
        MatchResult::NotMatched
    }
}

/// Applies `check` to every element, aggregating by mode: all elements must
/// match in `All`, at least one in `Any`.
fn split_over<F>(elements: &[Value], mode: MatchMode, check: F) -> MatchResult
where
    F: Fn(&Value) -> MatchResult,
{
    for element in elements {
        let result = check(element);
        match mode {
            MatchMode::All => {
                if result != MatchResult::Matched {
                    return MatchResult::NotMatched;
                }
            }
            MatchMode::Any => {
                if result == MatchResult::Matched {
                    return MatchResult::Matched;
                }
            }
        }
    }

    match mode {
        MatchMode::All => MatchResult::Matched,
        MatchMode::Any => MatchResult::NotMatched,
    }
}
