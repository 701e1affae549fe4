use std::sync::Arc;

use anyhow::{Context, Result};
use railq_core::{KeyValueStore, Notice, NoticeLevel, NoticeLog, NoticeSink, TicketResult};
use railq_session::{
    SearchOutcome, SearchSession, SessionOptions, StopsOutcome, SystemClock, ThemeController,
    ThemeSettings,
};
use railq_store::app_config::{Config, StorageBackend, StorageConfig};
use railq_store::{FileStore, HttpTicketService, MemoryStore, RedisStore};
use serde_json::json;
use tracing::info;

use crate::args::{Command, SearchArgs, Switch, ThemeAction};

/// Wired-up session, theme and notice log for one invocation.
pub struct App {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    notices: Arc<NoticeLog>,
    session: SearchSession,
    json: bool,
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => {
            let store = match &storage.path {
                Some(path) => FileStore::new(path),
                None => FileStore::at_default_location()?,
            };
            info!("Session file: {}", store.path().display());
            Arc::new(store)
        }
        StorageBackend::Redis => Arc::new(
            RedisStore::new(&storage.redis_url, &storage.key_prefix)
                .await
                .with_context(|| format!("Failed to open Redis at {}", storage.redis_url))?,
        ),
    };
    Ok(store)
}

impl App {
    pub async fn from_config(config: Config, json: bool) -> Result<Self> {
        let store = open_store(&config.storage).await?;
        let service = HttpTicketService::from_config(&config.api)
            .context("Failed to create the ticket API client")?;
        let notices = Arc::new(NoticeLog::new());

        let session = SearchSession::new(
            Arc::new(service),
            store.clone(),
            notices.clone(),
            SessionOptions::from(&config.api),
        );
        session.rehydrate().await;

        Ok(Self { config, store, notices, session, json })
    }

    /// Run one command; `Ok(false)` means it ended with an error notice.
    pub async fn run(&self, command: Command) -> Result<bool> {
        match command {
            Command::Stations { prefix } => {
                let options = self.session.query_stations(&prefix).await;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&options)?);
                } else {
                    for option in options {
                        println!("{}", option.label);
                    }
                }
            }
            Command::Search(args) => self.search(args).await?,
            Command::Stops { train_code } => self.stops(&train_code).await?,
            Command::Show => self.print_session()?,
            Command::Reset => {
                self.session.reset_form().await;
                println!("Saved search cleared");
            }
            Command::Theme { action } => self.theme(action).await?,
        }

        Ok(self.flush_notices())
    }

    async fn search(&self, args: SearchArgs) -> Result<()> {
        self.session
            .update_criteria(|criteria| {
                if args.clear_filters {
                    criteria.train_types.clear();
                    criteria.start_time = None;
                    criteria.end_time = None;
                    criteria.via_station.clear();
                }
                if let Some(from) = args.from_station {
                    criteria.from_station = from;
                }
                if let Some(to) = args.to_station {
                    criteria.to_station = to;
                }
                if args.date.is_some() {
                    criteria.train_date = args.date;
                }
                if !args.train_types.is_empty() {
                    criteria.train_types = args.train_types;
                }
                if args.start.is_some() {
                    criteria.start_time = args.start;
                }
                if args.end.is_some() {
                    criteria.end_time = args.end;
                }
                if let Some(via) = args.via {
                    criteria.via_station = via;
                }
            })
            .await;

        match self.session.search_tickets().await {
            SearchOutcome::Loaded(_) => self.print_tickets(&self.session.tickets())?,
            outcome => info!("Search finished: {:?}", outcome),
        }
        Ok(())
    }

    async fn stops(&self, train_code: &str) -> Result<()> {
        let outcome = self.session.show_train_stops(train_code).await;
        if !matches!(outcome, StopsOutcome::Cached(_) | StopsOutcome::Loaded(_)) {
            return Ok(());
        }

        let snapshot = self.session.snapshot();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot.train_stops)?);
            return Ok(());
        }
        for (i, stop) in snapshot.train_stops.iter().enumerate() {
            println!(
                "{:>3} {:<12} arr {:<5} dep {:<5} {}",
                stop.station_no.unwrap_or(i as u32 + 1),
                stop.station_name,
                stop.arrival_time.as_deref().unwrap_or("--"),
                stop.departure_time.as_deref().unwrap_or("--"),
                stop.stopover_time.as_deref().unwrap_or(""),
            );
        }
        Ok(())
    }

    fn print_session(&self) -> Result<()> {
        let criteria = self.session.criteria();
        let persisted = railq_session::persisted::PersistedCriteria::from(&criteria);
        if self.json {
            let body = json!({
                "criteria": persisted,
                "tickets": self.session.tickets(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(());
        }

        println!("from:  {}", persisted.from_station);
        println!("to:    {}", persisted.to_station);
        println!("date:  {}", persisted.train_date);
        println!("types: {}", persisted.train_types.join(","));
        println!("time:  {} - {}", persisted.start_time, persisted.end_time);
        println!("via:   {}", persisted.via_station);
        self.print_tickets(&self.session.tickets())
    }

    fn print_tickets(&self, tickets: &[TicketResult]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(tickets)?);
            return Ok(());
        }
        for ticket in tickets {
            let seats: Vec<String> = ticket
                .seats
                .iter()
                .map(|(class, status)| format!("{}:{}", class, status))
                .collect();
            println!(
                "{:<7} {} {} -> {} {}  {}  {}",
                ticket.train_code,
                ticket.from_station.station_name,
                ticket.from_station.departure_time.as_deref().unwrap_or("--"),
                ticket.to_station.station_name,
                ticket.to_station.arrival_time.as_deref().unwrap_or("--"),
                ticket.duration,
                seats.join(" "),
            );
        }
        Ok(())
    }

    async fn theme(&self, action: ThemeAction) -> Result<()> {
        let mut theme = ThemeController::new(
            self.store.clone(),
            Arc::new(SystemClock),
            ThemeSettings::from(&self.config.theme),
        );
        theme.init().await;

        match action {
            ThemeAction::Status => {}
            ThemeAction::Dark { mode } => theme.toggle_dark_mode(mode == Switch::On).await,
            ThemeAction::Color { hex } => {
                if let Err(err) = theme.update_primary_color(&hex).await {
                    self.notices.notify(Notice::error(err.to_string()));
                }
            }
        }

        let snapshot = theme.snapshot().await;
        let palette = theme.palette().await?;
        theme.shutdown();

        if self.json {
            let body = json!({
                "dark": snapshot.is_dark,
                "manual_control": snapshot.manual_control,
                "primary_color": snapshot.primary_color,
                "variables": palette.css_variables(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!(
                "mode: {}{}",
                if snapshot.is_dark { "dark" } else { "light" },
                if snapshot.manual_control { " (manual until midnight)" } else { "" }
            );
            for (name, value) in palette.css_variables() {
                println!("{}: {}", name, value);
            }
        }
        Ok(())
    }

    /// Print pending notices to stderr; false if any was an error.
    fn flush_notices(&self) -> bool {
        let mut clean = true;
        for notice in self.notices.drain() {
            clean &= notice.level != NoticeLevel::Error;
            eprintln!("{}", notice);
        }
        clean
    }
}
