//! Storage layout of a search session.
//!
//! Criteria live under [`CRITERIA_KEY`] as a camelCase JSON object whose date
//! is always an ISO `YYYY-MM-DD` string; results live under [`RESULTS_KEY`]
//! as a JSON array. Missing fields read back as their empty value.

use railq_core::search::{self, SearchCriteria, TicketResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CRITERIA_KEY: &str = "ticketSearchForm";
pub const RESULTS_KEY: &str = "ticketResults";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedCriteria {
    pub from_station: String,
    pub to_station: String,
    pub train_date: String,
    pub train_types: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub via_station: String,
}

impl From<&SearchCriteria> for PersistedCriteria {
    fn from(criteria: &SearchCriteria) -> Self {
        Self {
            from_station: criteria.from_station.clone(),
            to_station: criteria.to_station.clone(),
            train_date: criteria.date_string(),
            train_types: criteria.train_types.clone(),
            start_time: search::format_time(criteria.start_time),
            end_time: search::format_time(criteria.end_time),
            via_station: criteria.via_station.clone(),
        }
    }
}

impl PersistedCriteria {
    /// Unparsable dates or times are dropped rather than failing the whole form.
    pub fn into_criteria(self) -> SearchCriteria {
        let train_date = search::parse_date(&self.train_date).unwrap_or_else(|e| {
            warn!("Ignoring stored train date '{}': {}", self.train_date, e);
            None
        });
        let start_time = search::parse_time(&self.start_time).unwrap_or_else(|e| {
            warn!("Ignoring stored start time '{}': {}", self.start_time, e);
            None
        });
        let end_time = search::parse_time(&self.end_time).unwrap_or_else(|e| {
            warn!("Ignoring stored end time '{}': {}", self.end_time, e);
            None
        });

        SearchCriteria {
            from_station: self.from_station,
            to_station: self.to_station,
            train_date,
            train_types: self.train_types,
            start_time,
            end_time,
            via_station: self.via_station,
        }
    }
}

pub fn encode_criteria(criteria: &SearchCriteria) -> serde_json::Result<String> {
    serde_json::to_string(&PersistedCriteria::from(criteria))
}

pub fn decode_criteria(raw: &str) -> serde_json::Result<SearchCriteria> {
    serde_json::from_str::<PersistedCriteria>(raw).map(PersistedCriteria::into_criteria)
}

pub fn encode_results(tickets: &[TicketResult]) -> serde_json::Result<String> {
    serde_json::to_string(tickets)
}

pub fn decode_results(raw: &str) -> serde_json::Result<Vec<TicketResult>> {
    serde_json::from_str(raw)
}
