use std::fs;

use serde::Serialize;
use tickview_core::normalize::{normalize_series, RawCandle};
use tickview_core::{
    CandleRequest, CandleResponse, ChartRequest, ChartView, RangeKey, Series, UtcDateTime,
    ViewportClass,
};

use crate::cli::ChartArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Debug, Serialize)]
struct ChartOutput<'a> {
    instrument: Option<&'a str>,
    bars: usize,
    view: ChartView,
}

pub async fn run(args: &ChartArgs, context: &Context) -> Result<(), CliError> {
    let viewport = if args.compact {
        ViewportClass::Compact
    } else {
        ViewportClass::Regular
    };
    let mut request = ChartRequest::new(args.range, viewport);
    if let Some(width) = args.width {
        request = request.with_width(width);
    }

    let series = match (&args.input, &args.instrument) {
        (Some(path), _) => read_series(&fs::read_to_string(path)?)?,
        (None, Some(instrument)) => {
            let range = args.range.unwrap_or(RangeKey::OneDay);
            request.range = Some(range);
            let fetch = CandleRequest::for_range(instrument.as_str(), range, UtcDateTime::now())?;
            context.market.candles(fetch).await?.normalized()
        }
        (None, None) => {
            return Err(CliError::Command(String::from(
                "chart needs an instrument or --input",
            )))
        }
    };

    let view = ChartView::build(&series, request);
    output::render(
        &ChartOutput {
            instrument: args.instrument.as_deref(),
            bars: series.len(),
            view,
        },
        context.pretty,
    )
}

/// Accepts a bare candle array or a candle endpoint body.
fn read_series(text: &str) -> Result<Series, CliError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_array() {
        let records: Vec<RawCandle> = serde_json::from_value(value)?;
        Ok(normalize_series(&records))
    } else {
        let response: CandleResponse = serde_json::from_value(value)?;
        Ok(response.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_arrays_and_wrapped_bodies_read_alike() {
        let bare = r#"[[1709523000000, 10, 11, 9, 10.5, 100], {"t": 1709523060000, "c": "10.7"}]"#;
        let wrapped = format!(r#"{{"series": {bare}}}"#);

        let from_bare = read_series(bare).expect("bare");
        let from_wrapped = read_series(&wrapped).expect("wrapped");

        assert_eq!(from_bare.len(), 2);
        assert_eq!(from_bare, from_wrapped);
    }

    #[test]
    fn non_json_input_is_a_serialization_error() {
        let error = read_series("not json").expect_err("invalid");
        assert_eq!(error.exit_code(), 4);
    }
}
