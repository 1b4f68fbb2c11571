//! Time partitioning granularity
//!
//! Journals are split into one directory per time interval. `PartitionBy`
//! maps a commit timestamp (milliseconds since the Unix epoch, UTC) to the
//! directory name of its partition. Names of one granularity sort
//! lexicographically in time order, which the partition index relies on.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Directory name used by unpartitioned journals
pub const DEFAULT_PARTITION_NAME: &str = "default";

/// Partition granularity of a journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartitionBy {
    /// One partition per UTC day (`YYYY-MM-DD`)
    #[default]
    Day,
    /// One partition per UTC month (`YYYY-MM`)
    Month,
    /// One partition per UTC year (`YYYY`)
    Year,
    /// A single partition named [`DEFAULT_PARTITION_NAME`]
    None,
}

impl PartitionBy {
    /// Name of this granularity for logging and configuration
    pub fn name(&self) -> &'static str {
        match self {
            PartitionBy::Day => "day",
            PartitionBy::Month => "month",
            PartitionBy::Year => "year",
            PartitionBy::None => "none",
        }
    }

    /// Directory name of the partition holding `timestamp_ms`.
    pub fn partition_name(&self, timestamp_ms: i64) -> Result<String> {
        let pattern = match self {
            PartitionBy::Day => "%Y-%m-%d",
            PartitionBy::Month => "%Y-%m",
            PartitionBy::Year => "%Y",
            PartitionBy::None => return Ok(DEFAULT_PARTITION_NAME.to_string()),
        };
        let dt = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| Error::invalid(format!("timestamp out of range: {}", timestamp_ms)))?;
        Ok(dt.format(pattern).to_string())
    }

    /// Start (inclusive, ms) of the interval holding `timestamp_ms`.
    ///
    /// Unpartitioned journals have a single interval starting at 0.
    pub fn interval_start(&self, timestamp_ms: i64) -> Result<i64> {
        let dt = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| Error::invalid(format!("timestamp out of range: {}", timestamp_ms)))?;
        let date = match self {
            PartitionBy::Day => dt.date_naive(),
            PartitionBy::Month => NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)
                .ok_or_else(|| Error::invalid("invalid month start"))?,
            PartitionBy::Year => NaiveDate::from_ymd_opt(dt.year(), 1, 1)
                .ok_or_else(|| Error::invalid("invalid year start"))?,
            PartitionBy::None => return Ok(0),
        };
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::invalid("invalid interval start"))?;
        Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
    }
}

impl fmt::Display for PartitionBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PartitionBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(PartitionBy::Day),
            "month" => Ok(PartitionBy::Month),
            "year" => Ok(PartitionBy::Year),
            "none" => Ok(PartitionBy::None),
            other => Err(Error::config(format!(
                "unknown partition granularity '{}', expected day, month, year or none",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2015-03-14T15:09:26.535Z
    const TS: i64 = 1_426_345_766_535;

    #[test]
    fn test_partition_names() {
        assert_eq!(PartitionBy::Day.partition_name(TS).unwrap(), "2015-03-14");
        assert_eq!(PartitionBy::Month.partition_name(TS).unwrap(), "2015-03");
        assert_eq!(PartitionBy::Year.partition_name(TS).unwrap(), "2015");
        assert_eq!(PartitionBy::None.partition_name(TS).unwrap(), "default");
    }

    #[test]
    fn test_interval_start() {
        let day = PartitionBy::Day.interval_start(TS).unwrap();
        assert_eq!(PartitionBy::Day.partition_name(day).unwrap(), "2015-03-14");
        assert_eq!(PartitionBy::Day.partition_name(day - 1).unwrap(), "2015-03-13");

        let month = PartitionBy::Month.interval_start(TS).unwrap();
        assert_eq!(PartitionBy::Day.partition_name(month).unwrap(), "2015-03-01");

        let year = PartitionBy::Year.interval_start(TS).unwrap();
        assert_eq!(PartitionBy::Day.partition_name(year).unwrap(), "2015-01-01");

        assert_eq!(PartitionBy::None.interval_start(TS).unwrap(), 0);
    }

    #[test]
    fn test_names_sort_in_time_order() {
        let day_ms = 24 * 60 * 60 * 1000;
        let mut names: Vec<String> = (0..40)
            .map(|d| PartitionBy::Day.partition_name(TS + d * day_ms).unwrap())
            .collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("DAY".parse::<PartitionBy>().unwrap(), PartitionBy::Day);
        assert_eq!("month".parse::<PartitionBy>().unwrap(), PartitionBy::Month);
        assert!("hour".parse::<PartitionBy>().is_err());
    }
}
