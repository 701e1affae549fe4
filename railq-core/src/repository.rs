use async_trait::async_trait;
use chrono::NaiveDate;

use crate::search::{StopInfo, TicketQuery, TicketResult};
use crate::station::StationRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("storage file is corrupt: {0}")]
    Corrupt(String),
}

/// Failure talking to the remote ticket service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub detail: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(None, detail)
    }
}

/// Durable string key-value storage surviving restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`; removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Remote train ticket query service
#[async_trait]
pub trait TicketService: Send + Sync {
    async fn search_stations(&self, prefix: &str) -> Result<Vec<StationRecord>, RemoteError>;

    async fn query_tickets(&self, query: &TicketQuery) -> Result<Vec<TicketResult>, RemoteError>;

    async fn train_stops(
        &self,
        train_code: &str,
        train_date: NaiveDate,
    ) -> Result<Vec<StopInfo>, RemoteError>;
}
