use async_trait::async_trait;
use chrono::NaiveDate;
use railq_core::search::DATE_FORMAT;
use railq_core::{RemoteError, StationRecord, StopInfo, TicketQuery, TicketResult, TicketService};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

use crate::app_config::ApiConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("invalid base url '{0}'")]
    InvalidBaseUrl(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`TicketService`] backed by the ticket REST API.
#[derive(Clone)]
pub struct HttpTicketService {
    client: Client,
    base_url: Url,
}

impl HttpTicketService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiClientError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiClientError::InvalidBaseUrl(base_url.to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiClientError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_seconds))
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_body(status, &body);
            error!("Ticket API returned {}: {}", status, err.detail);
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            error!("Ticket API sent an unreadable body: {}", e);
            RemoteError::new(Some(status.as_u16()), format!("invalid response body: {}", e))
        })
    }
}

/// Prefer the `detail` field of a JSON error body, then the raw body, then the status text.
fn error_from_body(status: StatusCode, body: &str) -> RemoteError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned())
        .map(|detail| match detail {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });

    RemoteError::new(Some(status.as_u16()), detail)
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    error!("Ticket API request failed: {}", err);
    RemoteError::new(err.status().map(|s| s.as_u16()), err.to_string())
}

#[async_trait]
impl TicketService for HttpTicketService {
    async fn search_stations(&self, prefix: &str) -> Result<Vec<StationRecord>, RemoteError> {
        let url = self.endpoint(&["stations", prefix]);
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        Self::decode(response).await
    }

    async fn query_tickets(&self, query: &TicketQuery) -> Result<Vec<TicketResult>, RemoteError> {
        let url = self.endpoint(&["tickets", "query"]);
        debug!(
            "POST {} {} -> {} on {}",
            url, query.from_station, query.to_station, query.train_date
        );
        let response = self
            .client
            .post(url)
            .json(query)
            .send()
            .await
            .map_err(transport_error)?;
        Self::decode(response).await
    }

    async fn train_stops(
        &self,
        train_code: &str,
        train_date: NaiveDate,
    ) -> Result<Vec<StopInfo>, RemoteError> {
        let mut url = self.endpoint(&["trains", train_code, "stops"]);
        url.query_pairs_mut()
            .append_pair("train_date", &train_date.format(DATE_FORMAT).to_string());
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        Self::decode(response).await
    }
}
