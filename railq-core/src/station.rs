use serde::{Deserialize, Serialize};

/// Station as returned by `GET /stations/{prefix}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub name: String,
    pub code: String,
}

/// Autocomplete entry for the station inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationOption {
    pub value: String,
    pub label: String,
}

impl From<StationRecord> for StationOption {
    fn from(record: StationRecord) -> Self {
        Self {
            label: format!("{} ({})", record.name, record.code),
            value: record.name,
        }
    }
}
