use std::collections::HashMap;
use std::fs;

use serde::{Deserialize, Serialize};
use tickview_core::normalize::{normalize_series, RawCandle};
use tickview_core::valuation::sort_rows;
use tickview_core::{
    valuate, LiveSession, LiveView, LoadRequest, PortfolioFeed, PortfolioFrame, Position, RangeKey,
    SchedulerState, Series, SessionSettings, SessionSnapshot, Valuation,
};

use crate::cli::{PortfolioArgs, SortArgs, ValuateArgs};
use crate::error::CliError;
use crate::output;

use super::watch::print_refreshes;
use super::Context;

/// Offline valuation input.
#[derive(Debug, Deserialize)]
struct ValuationInput {
    positions: Vec<Position>,
    /// Raw daily candles keyed by instrument id.
    #[serde(default)]
    daily_closes: HashMap<String, Vec<RawCandle>>,
    #[serde(default)]
    live_prices: Option<HashMap<String, f64>>,
}

pub fn run(args: &ValuateArgs, context: &Context) -> Result<(), CliError> {
    let input: ValuationInput = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let valuation = valuate_input(&input, &args.sort)?;
    output::render(&valuation, context.pretty)
}

impl ValuationInput {
    /// Re-applies the position invariants that plain decoding skips.
    fn validated_positions(&self) -> Result<Vec<Position>, CliError> {
        self.positions
            .iter()
            .map(|position| {
                Position::new(
                    position.instrument_id.as_str(),
                    position.symbol.as_str(),
                    position.quantity,
                    position.average_cost,
                )
                .map_err(CliError::from)
            })
            .collect()
    }
}

fn valuate_input(input: &ValuationInput, sort: &SortArgs) -> Result<Valuation, CliError> {
    let positions = input.validated_positions()?;
    let daily: HashMap<String, Series> = input
        .daily_closes
        .iter()
        .map(|(id, records)| (id.clone(), normalize_series(records)))
        .collect();
    let mut valuation = valuate(&positions, &daily, input.live_prices.as_ref());
    sort_rows(&mut valuation.rows, sort.key(), sort.direction());
    Ok(valuation)
}

pub async fn portfolio(args: &PortfolioArgs, context: &Context) -> Result<(), CliError> {
    let feed = PortfolioFeed::new(
        context.market.clone(),
        context.account.clone(),
        &context.config,
    );
    if args.watch {
        let settings = SessionSettings::for_portfolio(&context.config);
        let session = LiveSession::start(feed, context.market.clone(), settings);
        return print_refreshes(session, args.ticks, |snapshot, scheduler| {
            PortfolioLine::new(snapshot, scheduler, &args.sort)
        })
        .await;
    }

    let mut frame = feed
        .load(LoadRequest {
            range: RangeKey::OneDay,
            silent: false,
        })
        .await?;
    sort_rows(
        &mut frame.valuation.rows,
        args.sort.key(),
        args.sort.direction(),
    );
    output::render(&frame, context.pretty)
}

/// One printed line per portfolio refresh.
#[derive(Debug, Serialize)]
struct PortfolioLine {
    refreshes: u64,
    scheduler: SchedulerState,
    cash: Option<f64>,
    valuation: Option<Valuation>,
    error: Option<String>,
}

impl PortfolioLine {
    fn new(
        snapshot: &SessionSnapshot<PortfolioFrame>,
        scheduler: SchedulerState,
        sort: &SortArgs,
    ) -> Self {
        let valuation = snapshot.data.as_ref().map(|frame| {
            let mut valuation = frame.valuation.clone();
            sort_rows(&mut valuation.rows, sort.key(), sort.direction());
            valuation
        });
        Self {
            refreshes: snapshot.refreshes,
            scheduler,
            cash: snapshot.data.as_ref().map(|frame| frame.snapshot.cash),
            valuation,
            error: snapshot.error.as_ref().map(ToString::to_string),
        }
    }
}
