use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use railq_cli::{App, CliArgs};
use railq_store::app_config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "railq_cli=info,railq_session=info,railq_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let config = Config::load_with(args.config.as_deref()).context("Failed to load config")?;
    tracing::debug!("Ticket API at {}", config.api.base_url);

    let app = App::from_config(config, args.json).await?;
    let clean = app.run(args.command).await?;

    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
