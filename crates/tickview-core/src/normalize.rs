//! Loosely-typed candle records and their normalization into a [`Series`].
//!
//! Upstream candle payloads arrive either as keyed records with optional,
//! possibly string-encoded fields, or as positional rows
//! `[timestamp, open, high, low, close, volume?]`. Normalization is a total
//! function: a record either becomes a [`Bar`] or is dropped, it never errors.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Bar, Series, UtcDateTime};

/// Scalar that may arrive as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Number(f64),
    Text(String),
}

impl LooseValue {
    /// Numeric reading; unparseable text yields NaN so callers can drop it.
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    pub(crate) fn to_timestamp(&self) -> Option<UtcDateTime> {
        match self {
            Self::Number(millis) => timestamp_from_millis(*millis),
            Self::Text(text) => match text.trim().parse::<f64>() {
                Ok(millis) => timestamp_from_millis(millis),
                Err(_) => UtcDateTime::parse(text).ok(),
            },
        }
    }
}

impl From<f64> for LooseValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for LooseValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Keyed candle record; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    #[serde(default, alias = "timestamp", alias = "time")]
    pub t: Option<LooseValue>,
    #[serde(default, alias = "open")]
    pub o: Option<LooseValue>,
    #[serde(default, alias = "high")]
    pub h: Option<LooseValue>,
    #[serde(default, alias = "low")]
    pub l: Option<LooseValue>,
    #[serde(default, alias = "close")]
    pub c: Option<LooseValue>,
    #[serde(default, alias = "volume")]
    pub v: Option<LooseValue>,
}

/// Raw candle as received from a provider, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCandle {
    Record(CandleRecord),
    Row(Vec<Option<LooseValue>>),
    /// Any other JSON value, such as `null` or a record with a boolean field.
    /// Kept so one bad element never fails the whole payload; it never yields a bar.
    Unreadable(serde_json::Value),
}

impl RawCandle {
    pub fn record(
        t: impl Into<LooseValue>,
        o: f64,
        h: f64,
        l: f64,
        c: f64,
        v: Option<f64>,
    ) -> Self {
        Self::Record(CandleRecord {
            t: Some(t.into()),
            o: Some(o.into()),
            h: Some(h.into()),
            l: Some(l.into()),
            c: Some(c.into()),
            v: v.map(LooseValue::from),
        })
    }

    fn fields(&self) -> [Option<&LooseValue>; 6] {
        match self {
            Self::Record(record) => [
                record.t.as_ref(),
                record.o.as_ref(),
                record.h.as_ref(),
                record.l.as_ref(),
                record.c.as_ref(),
                record.v.as_ref(),
            ],
            Self::Row(values) => {
                let at = |index: usize| values.get(index).and_then(Option::as_ref);
                [at(0), at(1), at(2), at(3), at(4), at(5)]
            }
            Self::Unreadable(_) => [None; 6],
        }
    }
}

/// Validates one record.
///
/// Missing close reads as 0; missing or non-numeric open/high/low fall back to
/// the close; volume that is absent or unparseable becomes `None`. Records with
/// an unreadable timestamp or a non-finite close are rejected.
pub fn normalize_record(raw: &RawCandle) -> Option<Bar> {
    let [t, o, h, l, c, v] = raw.fields();

    let timestamp = t?.to_timestamp()?;
    let close = c.map_or(0.0, LooseValue::to_f64);
    if !close.is_finite() {
        return None;
    }

    let price_or_close = |field: Option<&LooseValue>| {
        field
            .map(LooseValue::to_f64)
            .filter(|value| value.is_finite())
            .unwrap_or(close)
    };
    let volume = v.map(LooseValue::to_f64).filter(|value| value.is_finite());

    Some(Bar::new(
        timestamp,
        price_or_close(o),
        price_or_close(h),
        price_or_close(l),
        close,
        volume,
    ))
}

/// Normalizes a batch into an ascending, stable-sorted [`Series`].
pub fn normalize_series(records: &[RawCandle]) -> Series {
    let bars: Vec<Bar> = records.iter().filter_map(normalize_record).collect();
    let dropped = records.len() - bars.len();
    if dropped > 0 {
        debug!(dropped, kept = bars.len(), "dropped malformed candle records");
    }
    Series::from_bars(bars)
}

fn timestamp_from_millis(millis: f64) -> Option<UtcDateTime> {
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    UtcDateTime::from_unix_millis(millis as i64).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Vec<RawCandle> {
        serde_json::from_str(json).expect("valid candle json")
    }

    #[test]
    fn keyed_and_positional_records_normalize_alike() {
        let records = decode(
            r#"[
                {"t": "2024-03-04T04:00:00Z", "o": 10, "h": 12, "l": 9, "c": 11, "v": 500},
                ["2024-03-04 09:31", "11", "13", "10.5", "12.5", null]
            ]"#,
        );
        let series = normalize_series(&records);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].volume, Some(500.0));
        assert_eq!(series[1].high, 13.0);
        assert_eq!(series[1].volume, None);
    }

    #[test]
    fn missing_prices_fall_back_to_close() {
        let records = decode(r#"[{"timestamp": 1700000000000, "close": "42.5"}]"#);
        let bar = normalize_record(&records[0]).expect("kept");
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (42.5, 42.5, 42.5, 42.5));
    }

    #[test]
    fn missing_close_reads_as_zero() {
        let records = decode(r#"[{"t": 1700000000000}]"#);
        let bar = normalize_record(&records[0]).expect("kept");
        assert_eq!(bar.close, 0.0);
    }

    #[test]
    fn drops_unreadable_timestamp_or_close() {
        let records = decode(
            r#"[
                {"t": "not a date", "c": 1},
                {"c": 1},
                {"t": 1700000000000, "c": "n/a"},
                {"t": 1700000000000, "c": 3, "v": "lots"}
            ]"#,
        );
        let series = normalize_series(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].volume, None);
    }

    #[test]
    fn elements_of_any_other_shape_decode_and_are_dropped() {
        let records = decode(
            r#"[
                {"t": 1700000000000, "c": true},
                null,
                {"t": 1700000000000, "c": {"value": 1}},
                "2024-03-04",
                {"t": 1700000060000, "c": 5}
            ]"#,
        );
        assert!(matches!(records[1], RawCandle::Unreadable(_)));

        let series = normalize_series(&records);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].close, 5.0);
    }

    #[test]
    fn output_is_sorted_with_ties_in_input_order() {
        let records = vec![
            RawCandle::record(3_000.0, 1.0, 1.0, 1.0, 3.0, None),
            RawCandle::record(1_000.0, 1.0, 1.0, 1.0, 1.0, None),
            RawCandle::record(3_000.0, 1.0, 1.0, 1.0, 4.0, None),
        ];
        let closes: Vec<f64> = normalize_series(&records).iter().map(|bar| bar.close).collect();
        assert_eq!(closes, vec![1.0, 3.0, 4.0]);
    }
}
