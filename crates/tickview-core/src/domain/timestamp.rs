use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::{format_description, offset};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::ValidationError;

/// Offset of the reference exchange (IST). Naive timestamps are read in it.
pub const EXCHANGE_OFFSET: UtcOffset = offset!(+5:30);

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Absolute instant, always held in UTC and serialized as RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Self {
        Self(value.to_offset(UtcOffset::UTC))
    }

    pub fn from_unix_millis(millis: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map(Self)
            .map_err(|_| ValidationError::InvalidTimestamp {
                value: millis.to_string(),
            })
    }

    /// Parses RFC3339 with any offset, or a naive date/date-time in exchange time.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Ok(Self::from_offset_datetime(parsed));
        }

        let naive_formats = [
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            format_description!("[year]-[month]-[day]T[hour]:[minute]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        ];
        for format in naive_formats {
            if let Ok(naive) = PrimitiveDateTime::parse(trimmed, format) {
                return Ok(Self::from_offset_datetime(naive.assume_offset(EXCHANGE_OFFSET)));
            }
        }

        if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
            return Ok(Self::from_offset_datetime(
                date.midnight().assume_offset(EXCHANGE_OFFSET),
            ));
        }

        Err(ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        })
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn unix_millis(self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Same instant viewed in exchange-local time.
    pub fn in_exchange_time(self) -> OffsetDateTime {
        self.0.to_offset(EXCHANGE_OFFSET)
    }

    /// Wall-clock `at` (exchange time) on the exchange day containing `self`.
    pub fn exchange_day_at(self, at: Time) -> Self {
        let local = self.in_exchange_time();
        Self::from_offset_datetime(local.replace_time(at))
    }

    pub fn minus_days(self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    pub fn minus_minutes(self, minutes: i64) -> Self {
        Self(self.0 - Duration::minutes(minutes))
    }

    /// Fractional day distance from `earlier` to `self`.
    pub fn days_since(self, earlier: Self) -> f64 {
        (self.unix_millis() - earlier.unix_millis()) as f64 / MILLIS_PER_DAY as f64
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("UtcDateTime must be RFC3339 formattable")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
