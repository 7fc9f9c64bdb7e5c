use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tickview_core::chart::ChartSummary;
use tickview_core::{
    ChartFeed, ChartFrame, ChartRequest, FilePreferenceStore, FollowMarketSetting, LiveSession,
    LiveView, RangeKey, SchedulerState, SessionSettings, SessionSnapshot, Trend,
};
use tracing::info;

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

/// One printed line per applied refresh.
#[derive(Debug, Serialize)]
struct WatchLine {
    refreshes: u64,
    range: Option<RangeKey>,
    scheduler: SchedulerState,
    bars: usize,
    trend: Option<Trend>,
    summary: Option<ChartSummary>,
    error: Option<String>,
}

impl WatchLine {
    fn new(snapshot: &SessionSnapshot<ChartFrame>, scheduler: SchedulerState) -> Self {
        let frame = snapshot.data.as_ref();
        Self {
            refreshes: snapshot.refreshes,
            range: snapshot.range,
            scheduler,
            bars: frame.map_or(0, |frame| frame.series.len()),
            trend: frame.map(|frame| frame.view.trend()),
            summary: frame.and_then(|frame| frame.view.summary),
            error: snapshot.error.as_ref().map(ToString::to_string),
        }
    }
}

pub async fn run(args: &WatchArgs, context: &Context) -> Result<(), CliError> {
    let store = Arc::new(FilePreferenceStore::new(context.config.preferences_path.clone()));
    let follow_market = FollowMarketSetting::load(store)?.enabled();

    let mut settings = SessionSettings::from_config(&context.config, args.range, follow_market);
    if let Some(poll_ms) = args.poll_ms {
        if poll_ms == 0 {
            return Err(CliError::Command(String::from(
                "--poll-ms must be greater than zero",
            )));
        }
        settings = settings.with_price_poll(Duration::from_millis(poll_ms));
    }

    let feed = ChartFeed::new(
        context.market.clone(),
        args.instrument.as_str(),
        ChartRequest::default(),
    );
    let session = LiveSession::start(feed, context.market.clone(), settings);
    print_refreshes(session, args.ticks, WatchLine::new).await
}

/// Prints one line per applied refresh until `ticks` lines were printed or Ctrl-C.
pub(super) async fn print_refreshes<V, L>(
    session: LiveSession<V>,
    ticks: Option<u64>,
    mut line_for: impl FnMut(&SessionSnapshot<V::Output>, SchedulerState) -> L,
) -> Result<(), CliError>
where
    V: LiveView,
    L: Serialize,
{
    let mut updates = session.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0;
    let mut printed = 0;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = {
                    let snapshot = updates.borrow_and_update();
                    (snapshot.refreshes > seen).then(|| {
                        seen = snapshot.refreshes;
                        line_for(&snapshot, session.state())
                    })
                };
                if let Some(line) = line {
                    output::render_line(&line)?;
                    printed += 1;
                    if ticks.is_some_and(|ticks| printed >= ticks) {
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
