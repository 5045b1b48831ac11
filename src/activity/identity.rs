//! Bus client identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a bus client: the creator of an activity or one of its
/// subscribers.
///
/// Serialized as `{"type": "named", "id": "..."}` or `{"type": "anon"}` for
/// wire compatibility.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusId {
    /// A client with a stable bus name.
    #[serde(rename = "named")]
    Named {
        /// The bus name.
        id: String,
    },
    /// A transient client with no stable name.
    #[serde(rename = "anon")]
    Anonymous,
}

impl BusId {
    /// Convenience constructor for named identities.
    pub fn named(id: impl Into<String>) -> Self {
        BusId::Named { id: id.into() }
    }

    /// True for anonymous identities.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, BusId::Anonymous)
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusId::Named { id } => f.write_str(id),
            BusId::Anonymous => f.write_str("(anon)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag() {
        let named = serde_json::to_value(BusId::named("com.example.backup")).expect("json");
        assert_eq!(named, json!({"type": "named", "id": "com.example.backup"}));

        let anon = serde_json::to_value(BusId::Anonymous).expect("json");
        assert_eq!(anon, json!({"type": "anon"}));
    }

    #[test]
    fn round_trips() {
        let id: BusId =
            serde_json::from_value(json!({"type": "named", "id": "svc"})).expect("busid");
        assert_eq!(id, BusId::named("svc"));
    }
}
