mod account;
mod chart;
mod follow;
mod leaderboard;
mod valuate;
mod watch;

use std::sync::Arc;

use tickview_core::{
    AccountSource, HttpMarketSource, MarketSource, Position, SimulatedSource, TickviewConfig,
};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Resolved settings and upstream handles shared by every command.
pub struct Context {
    pub config: TickviewConfig,
    pub market: Arc<dyn MarketSource>,
    pub account: Arc<dyn AccountSource>,
    pub pretty: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = TickviewConfig::from_env()?;
        if let Some(base_url) = &cli.base_url {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }

        let (market, account) = if cli.mock {
            debug!("serving requests from the simulated source");
            shared(Arc::new(demo_source(&config)?))
        } else {
            debug!(base_url = %config.base_url, "serving requests over http");
            shared(Arc::new(HttpMarketSource::from_config(&config)))
        };

        Ok(Self {
            config,
            market,
            account,
            pretty: cli.pretty,
        })
    }
}

fn shared<S>(source: Arc<S>) -> (Arc<dyn MarketSource>, Arc<dyn AccountSource>)
where
    S: MarketSource + AccountSource + 'static,
{
    let market: Arc<dyn MarketSource> = source.clone();
    (market, source)
}

/// Offline account with a small seeded book.
fn demo_source(config: &TickviewConfig) -> Result<SimulatedSource, CliError> {
    let positions = vec![
        Position::new("2885", "RELIANCE", 12.0, 2_410.5)?,
        Position::new("11536", "TCS", 4.0, 3_725.0)?,
        Position::new("1594", "INFY", 25.0, 1_480.25)?,
    ];
    Ok(SimulatedSource::new()
        .with_deposit_ceiling(config.deposit_ceiling)
        .with_portfolio(250_000.0, positions))
}

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let context = Context::from_cli(cli)?;
    match &cli.command {
        Command::Chart(args) => chart::run(args, &context).await,
        Command::Valuate(args) => valuate::run(args, &context),
        Command::Portfolio(args) => valuate::portfolio(args, &context).await,
        Command::Leaderboard(args) => leaderboard::run(args, &context).await,
        Command::Watch(args) => watch::run(args, &context).await,
        Command::Follow(args) => follow::run(args, &context),
        Command::Deposit(args) => account::deposit(args, &context).await,
        Command::Trade(args) => account::trade(args, &context).await,
    }
}
