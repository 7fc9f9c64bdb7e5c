//! CLI argument definitions for tickview.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chart` | Render state for a candle file or a fetched symbol |
//! | `valuate` | Value positions from a JSON file |
//! | `portfolio` | Value the account's holdings at live prices |
//! | `leaderboard` | Rank symbols by period return |
//! | `watch` | Follow a live chart session |
//! | `follow` | Read or write the follow-market preference |
//! | `deposit` | Add cash to the account |
//! | `trade` | Submit a market order |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--mock` | `false` | Use the deterministic offline source |
//! | `--base-url` | `TICKVIEW_BASE_URL` | Backend root |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! tickview chart --input candles.json --range 1D --compact
//! tickview --mock leaderboard --range 1M RELIANCE TCS INFY HDFCBANK ITC SBIN
//! tickview --mock watch INFY --ticks 3
//! tickview --mock portfolio --watch
//! tickview follow off
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickview_core::{HoldingSort, RangeKey, SortDirection, TradeSide};

/// Market charts, live polling and portfolio valuation.
#[derive(Debug, Parser)]
#[command(
    name = "tickview",
    author,
    version,
    about = "Market charts, live polling and portfolio valuation",
    long_about = "tickview normalizes upstream candles, sizes them for the display, \
follows the market session with live polling and values holdings.\n\
\n\
Logs go to stderr and are filtered with TICKVIEW_LOG (default: warn).\n\
\n\
Use 'tickview <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Serve every request from the deterministic offline source.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Backend root URL.
    #[arg(long, global = true, env = "TICKVIEW_BASE_URL")]
    pub base_url: Option<String>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the display pipeline and print the chart render state.
    ///
    /// # Examples
    ///
    ///   tickview chart --input candles.json --width 640
    ///   tickview --mock chart INFY --range 1W --compact
    Chart(ChartArgs),

    /// Value positions from a JSON file.
    ///
    /// The file holds `positions`, `daily_closes` keyed by instrument id and
    /// optional `live_prices`.
    Valuate(ValuateArgs),

    /// Value the account's holdings with live prices and sparklines.
    ///
    /// # Examples
    ///
    ///   tickview --mock portfolio --sort day
    ///   tickview --mock portfolio --watch --ticks 5
    Portfolio(PortfolioArgs),

    /// Rank curated symbols by return over a range.
    ///
    /// # Examples
    ///
    ///   tickview --mock leaderboard --range 1M --top 3 RELIANCE TCS INFY ITC
    Leaderboard(LeaderboardArgs),

    /// Run a live session and print one line per refresh.
    ///
    /// Stops after `--ticks` refreshes or on Ctrl-C.
    Watch(WatchArgs),

    /// Show or change the persisted follow-market preference.
    Follow(FollowArgs),

    /// Deposit cash into the account.
    Deposit(DepositArgs),

    /// Submit a market order.
    ///
    /// # Examples
    ///
    ///   tickview trade buy INFY 10
    Trade(TradeArgs),
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    /// Instrument to fetch (symbol or exchange token).
    #[arg(required_unless_present = "input", conflicts_with = "input")]
    pub instrument: Option<String>,

    /// JSON candle file: an array of candles or `{"series": [...]}`.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Display range; inferred from the series span when omitted for files.
    #[arg(long)]
    pub range: Option<RangeKey>,

    /// Measured chart width in pixels.
    #[arg(long)]
    pub width: Option<f64>,

    /// Use the compact viewport profile.
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Debug, Args)]
pub struct ValuateArgs {
    /// Input JSON file.
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub sort: SortArgs,
}

#[derive(Debug, Args)]
pub struct PortfolioArgs {
    #[command(flatten)]
    pub sort: SortArgs,

    /// Keep re-valuing at live prices while the market is open.
    ///
    /// Polls every TICKVIEW_PORTFOLIO_POLL_MS and prints one line per refresh.
    #[arg(long, default_value_t = false)]
    pub watch: bool,

    /// Stop watching after this many refreshes.
    #[arg(long, requires = "watch")]
    pub ticks: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SortArgs {
    /// Holding sort key.
    #[arg(long, value_enum, default_value_t = SortKey::Value)]
    pub sort: SortKey,

    /// Sort ascending instead of descending.
    #[arg(long, default_value_t = false)]
    pub ascending: bool,
}

impl SortArgs {
    pub fn key(&self) -> HoldingSort {
        match self.sort {
            SortKey::Value => HoldingSort::Value,
            SortKey::Day => HoldingSort::Day,
            SortKey::Total => HoldingSort::Total,
            SortKey::Symbol => HoldingSort::Symbol,
        }
    }

    pub fn direction(&self) -> SortDirection {
        if self.ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Current market value.
    Value,
    /// Day P&L.
    Day,
    /// Total P&L.
    Total,
    /// Symbol, lexicographic.
    Symbol,
}

#[derive(Debug, Args)]
pub struct LeaderboardArgs {
    /// Symbols to rank.
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    #[arg(long, default_value = "1D")]
    pub range: RangeKey,

    /// Entries to keep; defaults to the configured leaderboard size.
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub instrument: String,

    #[arg(long, default_value = "LIVE")]
    pub range: RangeKey,

    /// Stop after this many refreshes.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Price poll period in milliseconds, overriding TICKVIEW_POLL_MS.
    #[arg(long)]
    pub poll_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct FollowArgs {
    /// New value; prints the current one when omitted.
    #[arg(value_enum)]
    pub state: Option<Toggle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Args)]
pub struct DepositArgs {
    pub amount: f64,
}

#[derive(Debug, Args)]
pub struct TradeArgs {
    /// BUY or SELL, case-insensitive.
    pub side: TradeSide,
    pub symbol: String,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn ranges_and_sides_parse_case_insensitively() {
        let cli = Cli::try_parse_from(["tickview", "--mock", "leaderboard", "--range", "1m", "INFY"])
            .expect("parses");
        match cli.command {
            Command::Leaderboard(args) => assert_eq!(args.range, RangeKey::OneMonth),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["tickview", "trade", "sell", "INFY", "3"]).expect("parses");
        match cli.command {
            Command::Trade(args) => {
                assert_eq!(args.side, TradeSide::Sell);
                assert_eq!(args.quantity, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn chart_requires_an_instrument_or_a_file() {
        assert!(Cli::try_parse_from(["tickview", "chart"]).is_err());
        assert!(Cli::try_parse_from(["tickview", "chart", "--input", "c.json"]).is_ok());
    }

    #[test]
    fn portfolio_ticks_require_watch() {
        assert!(Cli::try_parse_from(["tickview", "portfolio", "--ticks", "2"]).is_err());
        let cli = Cli::try_parse_from(["tickview", "portfolio", "--watch", "--ticks", "2"])
            .expect("parses");
        match cli.command {
            Command::Portfolio(args) => {
                assert!(args.watch);
                assert_eq!(args.ticks, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_range_is_rejected() {
        assert!(Cli::try_parse_from(["tickview", "watch", "INFY", "--range", "2Y"]).is_err());
    }
}
