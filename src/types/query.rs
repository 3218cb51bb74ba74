use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Look-back span understood by the market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::TenYears => "10y",
            Period::YearToDate => "ytd",
            Period::Max => "max",
        }
    }

    pub fn all() -> [Period; 11] {
        [
            Period::OneDay,
            Period::FiveDays,
            Period::OneMonth,
            Period::ThreeMonths,
            Period::SixMonths,
            Period::OneYear,
            Period::TwoYears,
            Period::FiveYears,
            Period::TenYears,
            Period::YearToDate,
            Period::Max,
        ]
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Period::all()
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| Error::invalid(format!("unknown period '{}'", s)))
    }
}

/// Bar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
    #[serde(rename = "1mo")]
    Mo1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::D1 => "1d",
            Interval::W1 => "1wk",
            Interval::Mo1 => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" | "60m" => Ok(Interval::H1),
            "1d" => Ok(Interval::D1),
            "1wk" => Ok(Interval::W1),
            "1mo" => Ok(Interval::Mo1),
            _ => Err(Error::invalid(format!("unknown interval '{}'", s))),
        }
    }
}

/// Which stretch of history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryRange {
    Period(Period),
    Between { start: NaiveDate, end: NaiveDate },
}

impl HistoryRange {
    /// Date ranges must be non-empty.
    pub fn between(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::invalid(format!(
                "start date {} must be before end date {}",
                start, end
            )));
        }
        Ok(HistoryRange::Between { start, end })
    }
}

impl From<Period> for HistoryRange {
    fn from(period: Period) -> Self {
        HistoryRange::Period(period)
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRange::Period(p) => write!(f, "{}", p),
            HistoryRange::Between { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing() {
        assert_eq!("1mo".parse::<Period>().unwrap(), Period::OneMonth);
        assert_eq!(" 2Y ".parse::<Period>().unwrap(), Period::TwoYears);
        assert!(matches!("7w".parse::<Period>(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_period_serde_uses_provider_codes() {
        let json = serde_json::to_string(&Period::SixMonths).unwrap();
        assert_eq!(json, "\"6mo\"");
        let back: Period = serde_json::from_str("\"ytd\"").unwrap();
        assert_eq!(back, Period::YearToDate);
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::M1);
        assert_eq!("60m".parse::<Interval>().unwrap(), Interval::H1);
        assert!("2h".parse::<Interval>().is_err());
    }

    #[test]
    fn test_between_requires_ordered_dates() {
        let a = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(HistoryRange::between(a, b).is_ok());
        assert!(HistoryRange::between(b, a).is_err());
        assert!(HistoryRange::between(a, a).is_err());
    }
}
