use serde::Serialize;
use tickview_core::{LeaderboardEntry, LeaderboardFeed, LiveView, LoadRequest, RangeKey};

use crate::cli::LeaderboardArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Debug, Serialize)]
struct LeaderboardOutput {
    range: RangeKey,
    entries: Vec<LeaderboardEntry>,
}

pub async fn run(args: &LeaderboardArgs, context: &Context) -> Result<(), CliError> {
    let size = args.top.unwrap_or(context.config.leaderboard_size);
    let feed = LeaderboardFeed::new(context.market.clone(), args.symbols.clone(), size);
    let entries = feed
        .load(LoadRequest {
            range: args.range,
            silent: false,
        })
        .await?;
    output::render(
        &LeaderboardOutput {
            range: args.range,
            entries,
        },
        context.pretty,
    )
}
