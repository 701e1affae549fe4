pub mod notice;
pub mod repository;
pub mod search;
pub mod station;

pub use notice::{Notice, NoticeLevel, NoticeLog, NoticeSink, TracingNotices};
pub use repository::{KeyValueStore, RemoteError, StoreError, TicketService};
pub use search::{
    MissingField, SearchCriteria, SeatStatus, StopInfo, TicketQuery, TicketResult,
};
pub use station::{StationOption, StationRecord};

/// Failures while moving session state in and out of storage.
///
/// Validation and remote failures are reported through notices and outcome
/// values instead, so they never travel as errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
