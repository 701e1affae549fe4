use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Criteria entered on the search form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub from_station: String,
    pub to_station: String,
    pub train_date: Option<NaiveDate>, // Just date, no time component
    pub train_types: Vec<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub via_station: String,
}

/// Required criteria field that was left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MissingField {
    #[error("departure station is required")]
    Origin,
    #[error("arrival station is required")]
    Destination,
    #[error("travel date is required")]
    Date,
}

impl MissingField {
    /// User-facing prompt shown when the field is missing.
    pub fn prompt(&self) -> &'static str {
        match self {
            MissingField::Origin => "Please enter a departure station",
            MissingField::Destination => "Please enter an arrival station",
            MissingField::Date => "Please select a travel date",
        }
    }
}

impl SearchCriteria {
    /// Check the required fields in form order and report the first missing one.
    pub fn validate(&self) -> Result<(), MissingField> {
        if self.from_station.trim().is_empty() {
            return Err(MissingField::Origin);
        }
        if self.to_station.trim().is_empty() {
            return Err(MissingField::Destination);
        }
        if self.train_date.is_none() {
            return Err(MissingField::Date);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchCriteria::default()
    }

    /// ISO calendar string of the selected date, or an empty string.
    pub fn date_string(&self) -> String {
        self.train_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// `HH:MM`, widened to `HH:MM:SS` when the seconds are set so that
/// [`parse_time`] reads back the same value.
pub fn format_time(time: Option<NaiveTime>) -> String {
    match time {
        Some(t) if t.second() != 0 => t.format("%H:%M:%S").to_string(),
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`); empty input means "no bound".
pub fn parse_time(raw: &str) -> Result<Option<NaiveTime>, chrono::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(Some)
}

pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, chrono::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map(Some)
}

/// Body of `POST /tickets/query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketQuery {
    pub from_station: String,
    pub to_station: String,
    pub train_date: String,
    pub purpose_codes: String,
    pub train_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_stops: Option<bool>,
}

impl TicketQuery {
    pub fn from_criteria(
        criteria: &SearchCriteria,
        purpose_codes: &str,
        include_stops: bool,
    ) -> Result<Self, MissingField> {
        criteria.validate()?;
        let via = criteria.via_station.trim();

        Ok(Self {
            from_station: criteria.from_station.trim().to_string(),
            to_station: criteria.to_station.trim().to_string(),
            train_date: criteria.date_string(),
            purpose_codes: purpose_codes.to_string(),
            train_types: criteria.train_types.clone(),
            start_time: criteria.start_time.map(|t| t.format(TIME_FORMAT).to_string()),
            end_time: criteria.end_time.map(|t| t.format(TIME_FORMAT).to_string()),
            via_station: (!via.is_empty()).then(|| via.to_string()),
            include_stops: include_stops.then_some(true),
        })
    }
}

/// A station visited by a train.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub station_name: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub stopover_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_no: Option<u32>,
}

/// One train returned by a ticket query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketResult {
    #[serde(default)]
    pub train_no: String,
    pub train_code: String,
    #[serde(default)]
    pub train_type: String,
    #[serde(default)]
    pub from_station: StopInfo,
    #[serde(default)]
    pub to_station: StopInfo,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub seats: BTreeMap<String, String>,
    #[serde(default)]
    pub prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub stops: Option<Vec<StopInfo>>,
}

impl TicketResult {
    /// Rewrite raw seat text into the two-state vocabulary.
    pub fn normalize_seats(&mut self) {
        for text in self.seats.values_mut() {
            *text = SeatStatus::classify(text).to_string();
        }
    }

    /// Embedded stop list, if the query returned a non-empty one.
    pub fn embedded_stops(&self) -> Option<&[StopInfo]> {
        self.stops.as_deref().filter(|stops| !stops.is_empty())
    }
}

/// Seat availability as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatStatus {
    Available,
    SoldOut,
    Other(String),
}

impl SeatStatus {
    pub const AVAILABLE: &'static str = "有票";
    pub const SOLD_OUT: &'static str = "无票";

    pub fn classify(raw: &str) -> Self {
        match raw {
            "有" | Self::AVAILABLE => SeatStatus::Available,
            "无" | Self::SOLD_OUT => SeatStatus::SoldOut,
            other => SeatStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatStatus::Available => f.write_str(Self::AVAILABLE),
            SeatStatus::SoldOut => f.write_str(Self::SOLD_OUT),
            SeatStatus::Other(text) => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beijing_shanghai() -> SearchCriteria {
        SearchCriteria {
            from_station: "Beijing".to_string(),
            to_station: "Shanghai".to_string(),
            train_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        assert_eq!(SearchCriteria::default().validate(), Err(MissingField::Origin));

        let mut criteria = beijing_shanghai();
        criteria.to_station = "   ".to_string();
        criteria.train_date = None;
        assert_eq!(criteria.validate(), Err(MissingField::Destination));

        criteria.to_station = "Shanghai".to_string();
        assert_eq!(criteria.validate(), Err(MissingField::Date));

        assert!(beijing_shanghai().validate().is_ok());
    }

    #[test]
    fn test_query_serialization_omits_unset_options() {
        let query = TicketQuery::from_criteria(&beijing_shanghai(), "ADULT", false).unwrap();
        let value = serde_json::to_value(&query).unwrap();

        assert_eq!(value["train_date"], "2024-06-01");
        assert_eq!(value["purpose_codes"], "ADULT");
        assert_eq!(value["train_types"], serde_json::json!([]));
        assert!(value.get("start_time").is_none());
        assert!(value.get("via_station").is_none());
        assert!(value.get("include_stops").is_none());
    }

    #[test]
    fn test_query_carries_window_and_via() {
        let mut criteria = beijing_shanghai();
        criteria.start_time = parse_time("08:00").unwrap();
        criteria.end_time = parse_time("12:30:00").unwrap();
        criteria.via_station = " Nanjing ".to_string();
        criteria.train_types = vec!["G".to_string(), "D".to_string()];

        let query = TicketQuery::from_criteria(&criteria, "ADULT", true).unwrap();
        assert_eq!(query.start_time.as_deref(), Some("08:00"));
        assert_eq!(query.end_time.as_deref(), Some("12:30"));
        assert_eq!(query.via_station.as_deref(), Some("Nanjing"));
        assert_eq!(query.include_stops, Some(true));
    }

    #[test]
    fn test_seat_normalization() {
        let mut ticket = TicketResult {
            train_code: "G1".to_string(),
            ..Default::default()
        };
        ticket.seats.insert("second_class".to_string(), "有".to_string());
        ticket.seats.insert("first_class".to_string(), "无".to_string());
        ticket.seats.insert("business_seat".to_string(), "7".to_string());
        ticket.seats.insert("no_seat".to_string(), "--".to_string());

        ticket.normalize_seats();
        assert_eq!(ticket.seats["second_class"], "有票");
        assert_eq!(ticket.seats["first_class"], "无票");
        assert_eq!(ticket.seats["business_seat"], "7");
        assert_eq!(ticket.seats["no_seat"], "--");

        // Already normalized text stays put.
        ticket.normalize_seats();
        assert_eq!(ticket.seats["second_class"], "有票");
    }

    #[test]
    fn test_ticket_deserialization_with_missing_fields() {
        let json = r#"
            {
                "train_code": "G101",
                "from_station": {"station_name": "北京南", "departure_time": "06:20"},
                "seats": {"second_class": "有"},
                "stops": []
            }
        "#;
        let ticket: TicketResult = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(ticket.train_code, "G101");
        assert_eq!(ticket.from_station.departure_time.as_deref(), Some("06:20"));
        assert!(ticket.prices.is_empty());
        assert!(ticket.embedded_stops().is_none());
    }
}
