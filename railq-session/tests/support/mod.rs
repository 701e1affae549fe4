#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use railq_core::{
    NoticeLog, RemoteError, SearchCriteria, StationRecord, StopInfo, TicketQuery, TicketResult,
    TicketService,
};
use railq_session::{SearchSession, SessionOptions};
use railq_store::MemoryStore;

struct Scripted<T> {
    delay: Duration,
    result: Result<T, RemoteError>,
}

/// Ticket service answering from per-endpoint queues; an empty queue answers `Ok(vec![])`.
#[derive(Default)]
pub struct FakeTicketService {
    station_calls: AtomicUsize,
    ticket_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    stations: Mutex<VecDeque<Result<Vec<StationRecord>, RemoteError>>>,
    tickets: Mutex<VecDeque<Scripted<Vec<TicketResult>>>>,
    stops: Mutex<VecDeque<Scripted<Vec<StopInfo>>>>,
    queries: Mutex<Vec<TicketQuery>>,
}

impl FakeTicketService {
    pub fn push_stations(&self, result: Result<Vec<StationRecord>, RemoteError>) {
        self.stations.lock().unwrap().push_back(result);
    }

    pub fn push_tickets(&self, result: Result<Vec<TicketResult>, RemoteError>) {
        self.push_tickets_after(Duration::ZERO, result);
    }

    pub fn push_tickets_after(
        &self,
        delay: Duration,
        result: Result<Vec<TicketResult>, RemoteError>,
    ) {
        self.tickets.lock().unwrap().push_back(Scripted { delay, result });
    }

    pub fn push_stops(&self, result: Result<Vec<StopInfo>, RemoteError>) {
        self.push_stops_after(Duration::ZERO, result);
    }

    pub fn push_stops_after(&self, delay: Duration, result: Result<Vec<StopInfo>, RemoteError>) {
        self.stops.lock().unwrap().push_back(Scripted { delay, result });
    }

    pub fn station_calls(&self) -> usize {
        self.station_calls.load(Ordering::SeqCst)
    }

    pub fn ticket_calls(&self) -> usize {
        self.ticket_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<TicketQuery> {
        self.queries.lock().unwrap().last().cloned()
    }
}

async fn play<T>(scripted: Option<Scripted<Vec<T>>>) -> Result<Vec<T>, RemoteError> {
    match scripted {
        Some(Scripted { delay, result }) => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl TicketService for FakeTicketService {
    async fn search_stations(&self, _prefix: &str) -> Result<Vec<StationRecord>, RemoteError> {
        self.station_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.stations.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn query_tickets(&self, query: &TicketQuery) -> Result<Vec<TicketResult>, RemoteError> {
        self.ticket_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        let next = self.tickets.lock().unwrap().pop_front();
        play(next).await
    }

    async fn train_stops(
        &self,
        _train_code: &str,
        _train_date: NaiveDate,
    ) -> Result<Vec<StopInfo>, RemoteError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.stops.lock().unwrap().pop_front();
        play(next).await
    }
}

pub struct Harness {
    pub service: Arc<FakeTicketService>,
    pub store: Arc<MemoryStore>,
    pub notices: Arc<NoticeLog>,
    pub session: SearchSession,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Fresh session over an existing store, as after a restart.
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let service = Arc::new(FakeTicketService::default());
        let notices = Arc::new(NoticeLog::new());
        let session = SearchSession::new(
            service.clone(),
            store.clone(),
            notices.clone(),
            SessionOptions::default(),
        );
        Self { service, store, notices, session }
    }
}

pub fn beijing_shanghai() -> SearchCriteria {
    SearchCriteria {
        from_station: "Beijing".to_string(),
        to_station: "Shanghai".to_string(),
        train_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        ..Default::default()
    }
}

pub fn stop(name: &str, no: u32) -> StopInfo {
    StopInfo {
        station_name: name.to_string(),
        arrival_time: Some("08:00".to_string()),
        departure_time: Some("08:02".to_string()),
        stopover_time: Some("2分钟".to_string()),
        station_no: Some(no),
    }
}

pub fn ticket(code: &str, seats: &[(&str, &str)], stops: Option<Vec<StopInfo>>) -> TicketResult {
    TicketResult {
        train_no: format!("24000{}", code),
        train_code: code.to_string(),
        train_type: "高铁".to_string(),
        from_station: stop("北京南", 1),
        to_station: stop("上海虹桥", 9),
        duration: "04:28".to_string(),
        seats: seats
            .iter()
            .map(|(class, text)| (class.to_string(), text.to_string()))
            .collect(),
        prices: Default::default(),
        stops,
    }
}

pub fn remote_failure(detail: &str) -> RemoteError {
    RemoteError::new(Some(500), detail)
}
