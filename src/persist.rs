//! # Best-effort persistence of activity definitions.
//!
//! On shutdown the service serializes the definitions of live `persistent`
//! activities together with their ids; on startup they are re-created in
//! `initialized` under their prior ids (force-allocation). Nothing else
//! survives a restart and no durability is guaranteed beyond the atomic
//! rename.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::{ActivityDefinition, ActivityId};

/// One persisted activity: its id plus the definition fields, flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedActivity {
    /// Id the activity held when it was saved; restore re-allocates it.
    pub activity_id: ActivityId,
    /// The definition as submitted.
    #[serde(flatten)]
    pub definition: ActivityDefinition,
}

/// Errors from saving or loading the definition file.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed definition file.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Saves records as a JSON array, replacing the file atomically.
pub fn save(path: &Path, records: &[PersistedActivity]) -> Result<(), PersistError> {
    let body = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads records; a missing file is an empty set.
pub fn load(path: &Path) -> Result<Vec<PersistedActivity>, PersistError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn round_trips_records_with_their_ids() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("activities.json");

        let records = vec![PersistedActivity {
            activity_id: 42,
            definition: serde_json::from_value(json!({
                "name": "backup",
                "creator": {"type": "named", "id": "com.example.backup"},
                "requirements": {"internet": true},
                "schedule": {"interval": "1d"},
                "flags": {"persistent": true}
            }))
            .expect("definition"),
        }];

        save(&path, &records).expect("save");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded, records);
    }

    #[test]
    fn the_id_is_flattened_next_to_the_definition_fields() {
        let record = PersistedActivity {
            activity_id: 7,
            definition: serde_json::from_value(json!({
                "name": "sync",
                "creator": {"type": "anon"}
            }))
            .expect("definition"),
        };

        let encoded = serde_json::to_value(&record).expect("encode");
        assert_eq!(encoded["activityId"], json!(7));
        assert_eq!(encoded["name"], json!("sync"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().expect("tempdir");
        let loaded = load(&dir.path().join("nope.json")).expect("load");
        assert!(loaded.is_empty());
    }
}
