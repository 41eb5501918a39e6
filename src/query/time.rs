use std::str::FromStr;

use jiff::{Timestamp, Zoned, civil::DateTime};

use super::error::QueryError;

/// Largest epoch the series window defaults to.
pub const EPOCHS_MAX: i64 = 2147483647;

/// A bound of a query window.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeArg {
    /// seconds since the unix epoch
    Epoch(i64),
    Timestamp(Timestamp),
    Zoned(Zoned),
    /// wall-clock time without an offset, cannot be placed on the epoch axis
    Civil(DateTime),
}

impl TimeArg {
    /// Whole epoch seconds, rounded down.
    pub fn to_epoch(&self) -> Result<i64, QueryError> {
        let ts = match self {
            Self::Epoch(epoch) => return Ok(*epoch),
            Self::Timestamp(ts) => *ts,
            Self::Zoned(zoned) => zoned.timestamp(),
            Self::Civil(dt) => return Err(QueryError::UnsupportedTimeFormat(dt.to_string())),
        };
        i64::try_from(ts.as_nanosecond().div_euclid(1_000_000_000))
            .map_err(|_| QueryError::UnsupportedTimeFormat(ts.to_string()))
    }
}

impl From<i64> for TimeArg {
    fn from(value: i64) -> Self {
        Self::Epoch(value)
    }
}

impl From<Timestamp> for TimeArg {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Zoned> for TimeArg {
    fn from(value: Zoned) -> Self {
        Self::Zoned(value)
    }
}

impl From<DateTime> for TimeArg {
    fn from(value: DateTime) -> Self {
        Self::Civil(value)
    }
}

impl FromStr for TimeArg {
    type Err = QueryError;

    /// Accepts epoch seconds, RFC 3339 timestamps and zoned datetimes
    /// such as `2017-10-01T00:00[Europe/Brussels]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(epoch) = s.parse::<i64>() {
            return Ok(Self::Epoch(epoch));
        }
        if let Ok(ts) = s.parse::<Timestamp>() {
            return Ok(Self::Timestamp(ts));
        }
        if let Ok(zoned) = s.parse::<Zoned>() {
            return Ok(Self::Zoned(zoned));
        }
        Err(QueryError::UnsupportedTimeFormat(s.to_string()))
    }
}

/// Renders an epoch as an RFC 3339 UTC timestamp.
pub fn epoch_to_timestamp(epoch: i64) -> Option<Timestamp> {
    Timestamp::from_second(epoch).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_epoch() {
        assert_eq!("1000".parse::<TimeArg>().unwrap(), TimeArg::Epoch(1000));
        assert_eq!(" -5 ".parse::<TimeArg>().unwrap().to_epoch().unwrap(), -5);
    }

    #[test]
    fn test_parse_timestamp() {
        let arg: TimeArg = "2017-10-01T00:00:00Z".parse().unwrap();
        assert_eq!(arg.to_epoch().unwrap(), 1506816000);

        let arg: TimeArg = "2017-10-01T02:00:00+02:00".parse().unwrap();
        assert_eq!(arg.to_epoch().unwrap(), 1506816000);
    }

    #[test]
    fn test_parse_zoned() {
        let arg: TimeArg = "2017-10-01T00:00:00+00:00[UTC]".parse().unwrap();
        assert_eq!(arg.to_epoch().unwrap(), 1506816000);
    }

    #[test]
    fn test_rounds_down() {
        let arg: TimeArg = "1969-12-31T23:59:59.5Z".parse().unwrap();
        assert_eq!(arg.to_epoch().unwrap(), -1);

        let arg: TimeArg = "2017-10-01T00:00:00.999Z".parse().unwrap();
        assert_eq!(arg.to_epoch().unwrap(), 1506816000);
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(
            "yesterday".parse::<TimeArg>(),
            Err(QueryError::UnsupportedTimeFormat(_))
        ));

        let civil = TimeArg::from(jiff::civil::date(2017, 10, 1).at(0, 0, 0, 0));
        assert!(matches!(
            civil.to_epoch(),
            Err(QueryError::UnsupportedTimeFormat(_))
        ));
    }

    #[test]
    fn test_epoch_to_timestamp() {
        assert_eq!(
            epoch_to_timestamp(1506816000).unwrap().to_string(),
            "2017-10-01T00:00:00Z"
        );
    }
}
