use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments accepted by the `railq` binary.
#[derive(Parser, Debug)]
#[command(
    name = "railq",
    version,
    about = "Search train tickets and keep the last search between runs"
)]
pub struct CliArgs {
    #[arg(
        short,
        long = "config",
        value_name = "FILE",
        env = "RAILQ_CONFIG",
        help = "Extra configuration file merged over config/ (default: none)"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print results as JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Suggest stations starting with a prefix
    Stations { prefix: String },
    /// Search tickets; flags update the saved criteria before searching
    Search(SearchArgs),
    /// Show the stops of a train from the last search
    Stops { train_code: String },
    /// Print the saved criteria and results
    Show,
    /// Clear the saved criteria and results
    Reset,
    /// Dark mode and primary colour
    Theme {
        #[command(subcommand)]
        action: ThemeAction,
    },
}

#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    #[arg(long = "from", value_name = "STATION")]
    pub from_station: Option<String>,
    #[arg(long = "to", value_name = "STATION")]
    pub to_station: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,
    #[arg(
        long = "type",
        value_name = "LETTER",
        help = "Train type filter, repeatable (G, D, Z, T, K)"
    )]
    pub train_types: Vec<String>,
    #[arg(long, value_name = "HH:MM", value_parser = parse_clock)]
    pub start: Option<NaiveTime>,
    #[arg(long, value_name = "HH:MM", value_parser = parse_clock)]
    pub end: Option<NaiveTime>,
    #[arg(long, value_name = "STATION")]
    pub via: Option<String>,
    #[arg(long, help = "Drop saved type, time and via filters first")]
    pub clear_filters: bool,
}

#[derive(Subcommand, Debug)]
pub enum ThemeAction {
    /// Print the current mode and palette
    Status,
    /// Set dark mode by hand until midnight
    Dark {
        #[arg(value_enum)]
        mode: Switch,
    },
    /// Change the primary colour
    Color { hex: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

fn parse_clock(raw: &str) -> Result<NaiveTime, String> {
    match railq_core::search::parse_time(raw) {
        Ok(Some(time)) => Ok(time),
        Ok(None) => Err("time must not be empty".to_string()),
        Err(e) => Err(format!("expected HH:MM ({})", e)),
    }
}
