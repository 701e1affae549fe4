use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use railq_core::{
    CoreResult, KeyValueStore, MissingField, Notice, NoticeSink, SearchCriteria, StationOption,
    StopInfo, TicketQuery, TicketResult, TicketService,
};
use railq_store::app_config::ApiConfig;
use tracing::{debug, error, info, warn};

use crate::persisted::{self, CRITERIA_KEY, RESULTS_KEY};

/// Query settings that do not come from the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub purpose_codes: String,
    pub include_stops: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            purpose_codes: "ADULT".to_string(),
            include_stops: true,
        }
    }
}

impl From<&ApiConfig> for SessionOptions {
    fn from(config: &ApiConfig) -> Self {
        Self {
            purpose_codes: config.purpose_codes.clone(),
            include_stops: config.include_stops,
        }
    }
}

/// How a call to [`SearchSession::search_tickets`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Validation failed; nothing was sent.
    Rejected(MissingField),
    Loaded(usize),
    Empty,
    Failed,
    /// A newer search (or a reset) was issued before this one resolved.
    Superseded,
}

/// How a call to [`SearchSession::show_train_stops`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopsOutcome {
    /// Served from the stop list embedded in the loaded ticket.
    Cached(usize),
    Loaded(usize),
    Empty,
    Rejected(MissingField),
    Failed,
    Superseded,
}

/// Observable session state at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub criteria: SearchCriteria,
    pub tickets: Vec<TicketResult>,
    pub train_stops: Vec<StopInfo>,
    pub stops_visible: bool,
    pub loading: bool,
    pub loading_stops: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    criteria: SearchCriteria,
    tickets: Vec<TicketResult>,
    train_stops: Vec<StopInfo>,
    stops_visible: bool,
    loading: bool,
    // In-flight stop lookups per train code
    loading_stops: HashMap<String, usize>,
    search_generation: u64,
    stops_generation: u64,
    reset_epoch: u64,
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the search loading flag when the owning search ends, however it ends.
struct SearchLoading<'a> {
    state: &'a Mutex<SessionState>,
    generation: u64,
}

impl Drop for SearchLoading<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        if state.search_generation == self.generation {
            state.loading = false;
        }
    }
}

/// Releases one in-flight marker for a train's stop lookup.
struct StopsLoading<'a> {
    state: &'a Mutex<SessionState>,
    train_code: String,
    epoch: u64,
}

impl Drop for StopsLoading<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        // A reset already cleared every marker from before it
        if state.reset_epoch != self.epoch {
            return;
        }
        if let Some(count) = state.loading_stops.get_mut(&self.train_code) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.loading_stops.remove(&self.train_code);
            }
        }
    }
}

/// Search form, cached results and stop display for one user session.
///
/// State is mirrored to a [`KeyValueStore`] so a new process can pick up where
/// the previous one stopped. Every failure ends in a notice and a defined
/// resting state; no operation returns an error to its caller.
pub struct SearchSession {
    service: Arc<dyn TicketService>,
    store: Arc<dyn KeyValueStore>,
    notices: Arc<dyn NoticeSink>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    // Held while state changes are written to storage
    io: tokio::sync::Mutex<()>,
}

type Encoded = CoreResult<(String, String)>;

impl SearchSession {
    pub fn new(
        service: Arc<dyn TicketService>,
        store: Arc<dyn KeyValueStore>,
        notices: Arc<dyn NoticeSink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            service,
            store,
            notices,
            options,
            state: Mutex::new(SessionState::default()),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        SessionSnapshot {
            criteria: state.criteria.clone(),
            tickets: state.tickets.clone(),
            train_stops: state.train_stops.clone(),
            stops_visible: state.stops_visible,
            loading: state.loading,
            loading_stops: state.loading_stops.keys().cloned().collect(),
        }
    }

    pub fn criteria(&self) -> SearchCriteria {
        lock(&self.state).criteria.clone()
    }

    pub fn tickets(&self) -> Vec<TicketResult> {
        lock(&self.state).tickets.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).loading
    }

    pub fn is_loading_stops(&self, train_code: &str) -> bool {
        lock(&self.state).loading_stops.contains_key(train_code)
    }

    /// Restore criteria and results from storage.
    ///
    /// Absent or unreadable entries leave the matching field empty.
    pub async fn rehydrate(&self) {
        let _io = self.io.lock().await;
        let criteria = self.read_entry(CRITERIA_KEY, persisted::decode_criteria).await;
        let tickets = self.read_entry(RESULTS_KEY, persisted::decode_results).await;

        let mut state = lock(&self.state);
        state.criteria = criteria.unwrap_or_default();
        state.tickets = tickets.unwrap_or_default();
        info!(
            "Session rehydrated: criteria {}, {} cached tickets",
            if state.criteria.is_empty() { "empty" } else { "restored" },
            state.tickets.len()
        );
    }

    /// Write the current criteria and results to storage.
    pub async fn persist(&self) {
        let _io = self.io.lock().await;
        let encoded = encode_state(&lock(&self.state));
        self.write_encoded(encoded).await;
    }

    /// Replace the form criteria and persist them.
    pub async fn set_criteria(&self, criteria: SearchCriteria) {
        self.update_criteria(|current| *current = criteria).await;
    }

    /// Edit the form criteria in place and persist the result.
    pub async fn update_criteria<F>(&self, edit: F)
    where
        F: FnOnce(&mut SearchCriteria),
    {
        let _io = self.io.lock().await;
        let encoded = {
            let mut state = lock(&self.state);
            edit(&mut state.criteria);
            encode_state(&state)
        };
        self.write_encoded(encoded).await;
    }

    /// Check required fields, warning about the first missing one.
    pub fn validate(&self, criteria: &SearchCriteria) -> bool {
        self.check(criteria).is_ok()
    }

    fn check(&self, criteria: &SearchCriteria) -> Result<(), MissingField> {
        criteria.validate().map_err(|missing| {
            self.notices.notify(Notice::warning(missing.prompt()));
            missing
        })
    }

    /// Station suggestions for an autocomplete prefix.
    pub async fn query_stations(&self, prefix: &str) -> Vec<StationOption> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Vec::new();
        }

        match self.service.search_stations(prefix).await {
            Ok(records) => records.into_iter().map(StationOption::from).collect(),
            Err(err) => {
                error!("Station lookup for '{}' failed: {}", prefix, err);
                self.notices
                    .notify(Notice::error(format!("Station lookup failed: {}", err.detail)));
                Vec::new()
            }
        }
    }

    /// Run a ticket query for the current criteria.
    ///
    /// Only the most recently issued search applies its response; an older one
    /// that resolves later is dropped. Results are persisted on success only.
    pub async fn search_tickets(&self) -> SearchOutcome {
        let criteria = self.criteria();
        if let Err(missing) = self.check(&criteria) {
            return SearchOutcome::Rejected(missing);
        }
        let query = match TicketQuery::from_criteria(
            &criteria,
            &self.options.purpose_codes,
            self.options.include_stops,
        ) {
            Ok(query) => query,
            Err(missing) => return SearchOutcome::Rejected(missing),
        };

        let generation = {
            let mut state = lock(&self.state);
            state.search_generation += 1;
            state.loading = true;
            state.search_generation
        };
        let loading = SearchLoading { state: &self.state, generation };

        info!(
            "Search #{}: {} -> {} on {}",
            generation, query.from_station, query.to_station, query.train_date
        );
        let response = self.service.query_tickets(&query).await;

        // Storage lock first so a concurrent reset cannot slip between apply and write
        let _io = self.io.lock().await;
        let applied = {
            let mut state = lock(&self.state);
            if state.search_generation != generation {
                None
            } else {
                Some(match response {
                    Ok(mut tickets) => {
                        tickets.iter_mut().for_each(TicketResult::normalize_seats);
                        let count = tickets.len();
                        state.tickets = tickets;
                        Ok((count, encode_state(&state)))
                    }
                    Err(err) => {
                        state.tickets.clear();
                        Err(err)
                    }
                })
            }
        };
        drop(loading);

        match applied {
            None => {
                debug!("Dropping response of superseded search #{}", generation);
                SearchOutcome::Superseded
            }
            Some(Err(err)) => {
                error!("Search #{} failed: {}", generation, err);
                self.notices
                    .notify(Notice::error(format!("Ticket search failed: {}", err.detail)));
                SearchOutcome::Failed
            }
            Some(Ok((count, encoded))) => {
                self.write_encoded(encoded).await;
                info!("Search #{} returned {} trains", generation, count);
                if count == 0 {
                    self.notices.notify(Notice::info("No trains match the search"));
                    SearchOutcome::Empty
                } else {
                    SearchOutcome::Loaded(count)
                }
            }
        }
    }

    /// Clear the form, results and stop display, and drop the stored session.
    pub async fn reset_form(&self) {
        let _io = self.io.lock().await;
        {
            let mut state = lock(&self.state);
            state.criteria = SearchCriteria::default();
            state.tickets.clear();
            state.train_stops.clear();
            state.stops_visible = false;
            state.loading = false;
            state.loading_stops.clear();
            // In-flight responses from before the reset must not land
            state.search_generation += 1;
            state.stops_generation += 1;
            state.reset_epoch += 1;
        }

        for key in [CRITERIA_KEY, RESULTS_KEY] {
            if let Err(err) = self.store.remove(key).await {
                warn!("Failed to remove '{}' from storage: {}", key, err);
            }
        }
        info!("Search form reset");
    }

    /// Open the stop list for a train.
    ///
    /// Uses the stops embedded in the loaded result when present, otherwise
    /// queries the service for the selected date.
    pub async fn show_train_stops(&self, train_code: &str) -> StopsOutcome {
        let pending = {
            let mut state = lock(&self.state);
            let cached = state
                .tickets
                .iter()
                .find(|ticket| ticket.train_code == train_code)
                .and_then(TicketResult::embedded_stops)
                .map(<[StopInfo]>::to_vec);

            if let Some(stops) = cached {
                let count = stops.len();
                state.stops_generation += 1;
                state.train_stops = stops;
                state.stops_visible = true;
                debug!("Stops for {} served from loaded results", train_code);
                return StopsOutcome::Cached(count);
            }

            let train_date = state.criteria.train_date;
            train_date.map(|date| {
                state.stops_generation += 1;
                *state.loading_stops.entry(train_code.to_string()).or_insert(0) += 1;
                (date, state.stops_generation, state.reset_epoch)
            })
        };

        let Some((date, generation, epoch)) = pending else {
            self.notices.notify(Notice::warning(MissingField::Date.prompt()));
            return StopsOutcome::Rejected(MissingField::Date);
        };
        let loading = StopsLoading {
            state: &self.state,
            train_code: train_code.to_string(),
            epoch,
        };

        let response = self.service.train_stops(train_code, date).await;
        drop(loading);

        let mut state = lock(&self.state);
        if state.stops_generation != generation {
            debug!("Dropping superseded stop list for {}", train_code);
            return StopsOutcome::Superseded;
        }

        match response {
            Ok(stops) if stops.is_empty() => {
                state.train_stops.clear();
                state.stops_visible = false;
                drop(state);
                self.notices.notify(Notice::warning("No stop information for this train"));
                StopsOutcome::Empty
            }
            Ok(stops) => {
                let count = stops.len();
                state.train_stops = stops;
                state.stops_visible = true;
                StopsOutcome::Loaded(count)
            }
            Err(err) => {
                state.train_stops.clear();
                state.stops_visible = false;
                drop(state);
                error!("Stop lookup for {} failed: {}", train_code, err);
                self.notices
                    .notify(Notice::error(format!("Failed to load stops: {}", err.detail)));
                StopsOutcome::Failed
            }
        }
    }

    /// Hide the stop list.
    pub fn close_stops(&self) {
        lock(&self.state).stops_visible = false;
    }

    async fn read_entry<T>(
        &self,
        key: &str,
        decode: fn(&str) -> serde_json::Result<T>,
    ) -> Option<T> {
        self.load_entry(key, decode).await.unwrap_or_else(|err| {
            warn!("Discarding '{}' entry: {}", key, err);
            None
        })
    }

    async fn load_entry<T>(
        &self,
        key: &str,
        decode: fn(&str) -> serde_json::Result<T>,
    ) -> CoreResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_encoded(&self, encoded: Encoded) {
        if let Err(err) = self.store_encoded(encoded).await {
            warn!("Failed to persist session: {}", err);
        }
    }

    async fn store_encoded(&self, encoded: Encoded) -> CoreResult<()> {
        let (criteria, results) = encoded?;
        self.store.set(CRITERIA_KEY, &criteria).await?;
        self.store.set(RESULTS_KEY, &results).await?;
        Ok(())
    }
}

fn encode_state(state: &SessionState) -> Encoded {
    Ok((
        persisted::encode_criteria(&state.criteria)?,
        persisted::encode_results(&state.tickets)?,
    ))
}
