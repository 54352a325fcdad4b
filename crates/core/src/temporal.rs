//! Periods and year ranges of temporal datasets

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::raster::Raster;

/// Month of a given year attached to one layer of a temporal dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    /// 1 = January ... 12 = December
    pub month: u8,
}

impl Period {
    pub fn new(year: i32, month: u8) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidParameter {
                name: "month",
                value: month.to_string(),
                reason: "month must be in 1..=12".into(),
            });
        }
        Ok(Self { year, month })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive range of whole years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_year: i32,
    pub end_year: i32,
}

impl TimeRange {
    pub fn new(start_year: i32, end_year: i32) -> Result<Self> {
        if start_year > end_year {
            return Err(Error::InvalidParameter {
                name: "time_range",
                value: format!("{}..={}", start_year, end_year),
                reason: "start year is after end year".into(),
            });
        }
        Ok(Self {
            start_year,
            end_year,
        })
    }

    /// Number of years covered
    pub fn years(&self) -> u32 {
        (self.end_year - self.start_year + 1) as u32
    }

    pub fn contains(&self, period: &Period) -> bool {
        (self.start_year..=self.end_year).contains(&period.year)
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start_year.max(other.start_year);
        let end = self.end_year.min(other.end_year);
        (start <= end).then_some(TimeRange {
            start_year: start,
            end_year: end,
        })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start_year, self.end_year)
    }
}

/// One layer of a fetched dataset: a raster, and its period when the
/// dataset is temporal
#[derive(Debug, Clone)]
pub struct Layer {
    pub period: Option<Period>,
    pub raster: Raster<f64>,
}

impl Layer {
    pub fn new(period: Option<Period>, raster: Raster<f64>) -> Self {
        Self { period, raster }
    }

    pub fn is_temporal(&self) -> bool {
        self.period.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range() {
        let r = TimeRange::new(2001, 2020).unwrap();
        assert_eq!(r.years(), 20);
        assert!(r.contains(&Period::new(2001, 6).unwrap()));
        assert!(!r.contains(&Period::new(2021, 1).unwrap()));
        assert!(TimeRange::new(2021, 2020).is_err());
    }

    #[test]
    fn test_intersection() {
        let a = TimeRange::new(1990, 2005).unwrap();
        let b = TimeRange::new(2000, 2020).unwrap();
        assert_eq!(a.intersection(&b), Some(TimeRange::new(2000, 2005).unwrap()));
        let c = TimeRange::new(2010, 2012).unwrap();
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_period_month_bounds() {
        assert!(Period::new(2000, 0).is_err());
        assert!(Period::new(2000, 13).is_err());
        assert_eq!(Period::new(2000, 3).unwrap().to_string(), "2000-03");
    }
}
