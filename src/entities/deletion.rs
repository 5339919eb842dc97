// 🗑️ Pending Deletion - a proposal to remove one live building
//
// The deletion points at the building's storage key (a back-reference, not
// ownership). The name is copied at submission time so the queue can be
// listed and searched without the join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDeletion {
    /// Storage key (`row_id`) of the referenced building
    pub building_ref: i64,

    /// Denormalized building name
    pub name: String,

    #[serde(rename = "submittedDate")]
    pub submitted_date: DateTime<Utc>,
}

impl PendingDeletion {
    pub fn new(building_ref: i64, name: String, submitted_date: DateTime<Utc>) -> Self {
        PendingDeletion {
            building_ref,
            name,
            submitted_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_uses_wire_names() {
        let deletion = PendingDeletion::new(7, "Old Mill".to_string(), Utc::now());
        let json = serde_json::to_value(&deletion).unwrap();

        assert_eq!(json["building_ref"], 7);
        assert_eq!(json["name"], "Old Mill");
        assert!(json.get("submittedDate").is_some());
    }
}
