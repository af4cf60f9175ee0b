use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Temporal resolution at which a dataset is split into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Granularity {
    type Err = GeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" | "annual" => Ok(Granularity::Year),
            other => Err(GeoError::invalid(
                "granularity",
                format!("expected day|month|year, got `{other}`"),
            )),
        }
    }
}

/// One discrete download unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
    Static,
}

impl TimeUnit {
    /// Compact stamp used in file and manifest names: `YYYYMMDD`, `YYYYMM` or `YYYY`.
    pub fn stamp(&self) -> String {
        match self {
            TimeUnit::Day(date) => date.format("%Y%m%d").to_string(),
            TimeUnit::Month { year, month } => format!("{year:04}{month:02}"),
            TimeUnit::Year(year) => format!("{year:04}"),
            TimeUnit::Static => String::new(),
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            TimeUnit::Day(date) => Some(date.year()),
            TimeUnit::Month { year, .. } => Some(*year),
            TimeUnit::Year(year) => Some(*year),
            TimeUnit::Static => None,
        }
    }

    pub fn month(&self) -> Option<u32> {
        match self {
            TimeUnit::Day(date) => Some(date.month()),
            TimeUnit::Month { month, .. } => Some(*month),
            TimeUnit::Year(_) | TimeUnit::Static => None,
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        match self {
            TimeUnit::Day(date) => Some(*date),
            TimeUnit::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1),
            TimeUnit::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
            TimeUnit::Static => None,
        }
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        match self {
            TimeUnit::Day(date) => Some(*date),
            TimeUnit::Month { .. } => self
                .first_day()?
                .checked_add_months(Months::new(1))?
                .pred_opt(),
            TimeUnit::Year(year) => NaiveDate::from_ymd_opt(*year, 12, 31),
            TimeUnit::Static => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            TimeUnit::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            TimeUnit::Year(year) => write!(f, "{year:04}"),
            TimeUnit::Static => write!(f, "static"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
}

impl TimeRange {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Self, GeoError> {
        if start > end {
            return Err(GeoError::invalid(
                "end",
                format!("end {end} is before start {start}"),
            ));
        }
        Ok(Self {
            start,
            end,
            granularity,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Every unit touched by the range, inclusive on both ends, ascending.
    pub fn units(&self) -> Vec<TimeUnit> {
        match self.granularity {
            Granularity::Day => self
                .start
                .iter_days()
                .take_while(|day| *day <= self.end)
                .map(TimeUnit::Day)
                .collect(),
            Granularity::Month => {
                let first = month_index(self.start);
                let last = month_index(self.end);
                (first..=last)
                    .map(|index| TimeUnit::Month {
                        year: index.div_euclid(12),
                        month: index.rem_euclid(12) as u32 + 1,
                    })
                    .collect()
            }
            Granularity::Year => (self.start.year()..=self.end.year())
                .map(TimeUnit::Year)
                .collect(),
        }
    }

    pub fn first_unit(&self) -> TimeUnit {
        unit_containing(self.start, self.granularity)
    }

    pub fn last_unit(&self) -> TimeUnit {
        unit_containing(self.end, self.granularity)
    }
}

/// Number of units `TimeRange::units` yields for the same bounds.
pub fn count_units(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> usize {
    if start > end {
        return 0;
    }
    let count = match granularity {
        Granularity::Day => (end - start).num_days() + 1,
        Granularity::Month => i64::from(month_index(end) - month_index(start)) + 1,
        Granularity::Year => i64::from(end.year() - start.year()) + 1,
    };
    usize::try_from(count).unwrap_or(0)
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn unit_containing(date: NaiveDate, granularity: Granularity) -> TimeUnit {
    match granularity {
        Granularity::Day => TimeUnit::Day(date),
        Granularity::Month => TimeUnit::Month {
            year: date.year(),
            month: date.month(),
        },
        Granularity::Year => TimeUnit::Year(date.year()),
    }
}

/// What kind of spatial selector a dataset consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    None,
    Region,
    BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialSelector {
    /// Tile id or administrative code, e.g. an ISO 3166 alpha-3 country code.
    Region(String),
    BoundingBox(BoundingBox),
}

impl SpatialSelector {
    pub fn kind(&self) -> SelectorKind {
        match self {
            SpatialSelector::Region(_) => SelectorKind::Region,
            SpatialSelector::BoundingBox(_) => SelectorKind::BoundingBox,
        }
    }

    pub fn region(&self) -> Option<&str> {
        match self {
            SpatialSelector::Region(code) => Some(code),
            SpatialSelector::BoundingBox(_) => None,
        }
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        match self {
            SpatialSelector::BoundingBox(bbox) => Some(bbox),
            SpatialSelector::Region(_) => None,
        }
    }
}

impl fmt::Display for SpatialSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialSelector::Region(code) => write!(f, "region:{code}"),
            SpatialSelector::BoundingBox(bbox) => write!(
                f,
                "bbox:{},{},{},{}",
                bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
            ),
        }
    }
}

impl FromStr for SpatialSelector {
    type Err = GeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (kind, rest) = trimmed.split_once(':').unwrap_or(("region", trimmed));
        match kind {
            "region" | "tile" => {
                let code = rest.trim();
                let is_valid = !code.is_empty()
                    && code
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
                if !is_valid {
                    return Err(GeoError::invalid(
                        "spatial_selector",
                        format!("invalid region code `{rest}`"),
                    ));
                }
                Ok(SpatialSelector::Region(code.to_string()))
            }
            "bbox" => Ok(SpatialSelector::BoundingBox(rest.parse()?)),
            other => Err(GeoError::invalid(
                "spatial_selector",
                format!("expected region:<code> or bbox:<coords>, got `{other}:`"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl FromStr for BoundingBox {
    type Err = GeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let coords = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| GeoError::invalid("spatial_selector", format!("bbox: {err}")))?;
        let &[min_lon, min_lat, max_lon, max_lat] = coords.as_slice() else {
            return Err(GeoError::invalid(
                "spatial_selector",
                "bbox needs four values: min_lon,min_lat,max_lon,max_lat",
            ));
        };
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        if !(lon_ok(min_lon) && lon_ok(max_lon) && lat_ok(min_lat) && lat_ok(max_lat)) {
            return Err(GeoError::invalid(
                "spatial_selector",
                "bbox coordinates out of range",
            ));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(GeoError::invalid(
                "spatial_selector",
                "bbox minimum must be below maximum",
            ));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }
}

/// External tool that performs a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    Curl,
    Wget,
}

impl TransferMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMethod::Curl => "curl",
            TransferMethod::Wget => "wget",
        }
    }

    /// Flags recorded in the manifest between the tool and `-o`.
    pub fn manifest_flags(&self) -> &'static [&'static str] {
        match self {
            TransferMethod::Curl => &[
                "--fail",
                "--location",
                "--silent",
                "--show-error",
                "--create-dirs",
            ],
            TransferMethod::Wget => &["--quiet", "--no-verbose"],
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMethod {
    type Err = GeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "curl" => Ok(TransferMethod::Curl),
            "wget" => Ok(TransferMethod::Wget),
            other => Err(GeoError::invalid(
                "transfer_method",
                format!("unknown transfer tool `{other}`"),
            )),
        }
    }
}
