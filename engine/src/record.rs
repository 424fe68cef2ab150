//! Committed rows of the memory store.

use crate::{ObjectId, Version};
use serde::{Deserialize, Serialize};

/// One committed entity in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Permanent id of the entity
    pub id: ObjectId,
    /// Version number, incremented on each committed change
    pub version: Version,
    /// Attribute payload (JSON object)
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(id: ObjectId, payload: serde_json::Value) -> Self {
        Self {
            id,
            version: 1,
            payload,
        }
    }

    /// Replace the payload. Returns `false` and keeps the version when the
    /// payload is unchanged.
    pub fn update_payload(&mut self, payload: serde_json::Value) -> bool {
        if self.payload == payload {
            return false;
        }
        self.payload = payload;
        self.version += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record() {
        let record = Record::new(ObjectId::new("Tag", 1), json!({"name": "red"}));
        assert_eq!(record.version, 1);
        assert_eq!(record.payload, json!({"name": "red"}));
    }

    #[test]
    fn update_bumps_version_only_on_change() {
        let mut record = Record::new(ObjectId::new("Tag", 1), json!({"name": "red"}));

        assert!(!record.update_payload(json!({"name": "red"})));
        assert_eq!(record.version, 1);

        assert!(record.update_payload(json!({"name": "crimson"})));
        assert_eq!(record.version, 2);
        assert_eq!(record.payload["name"], "crimson");
    }

    #[test]
    fn serialization_format() {
        let record = Record::new(ObjectId::new("Tag", 3), json!({"name": "red"}));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"version\":1"));
        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
