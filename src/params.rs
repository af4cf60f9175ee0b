use std::sync::LazyLock;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Granularity, SelectorKind, SpatialSelector, TimeRange, TimeUnit};
use crate::error::GeoError;
use crate::sources::{Registry, SourceAdapter};

static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(?:-?(\d{2}))?(?:-?(\d{2}))?$").expect("valid regex")
});

/// User-supplied parameters before validation, as they arrive from the CLI or
/// a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawParameters {
    pub dataset: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub spatial_selector: Option<String>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub output_directory: Option<String>,
    #[serde(default)]
    pub acknowledge: bool,
}

/// Validated, canonical request for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub dataset_id: String,
    /// `None` only for datasets without a temporal axis.
    pub time_range: Option<TimeRange>,
    pub spatial_selector: Option<SpatialSelector>,
    pub variable: Option<String>,
    pub format: Option<String>,
    pub output_directory: Utf8PathBuf,
    pub acknowledged: bool,
}

pub struct Normalizer;

impl Normalizer {
    pub fn normalize(
        raw: RawParameters,
        registry: &Registry,
    ) -> Result<ParameterDescriptor, GeoError> {
        if !raw.acknowledge {
            return Err(GeoError::AcknowledgementRequired);
        }

        let dataset = raw.dataset.trim();
        if dataset.is_empty() {
            return Err(GeoError::invalid("dataset", "dataset id is empty"));
        }
        let adapter = registry.lookup(dataset)?;

        let time_range = Self::time_range(&raw, adapter)?;
        let spatial_selector = Self::selector(raw.spatial_selector.as_deref(), adapter)?;
        let output_directory = Self::output_directory(raw.output_directory.as_deref())?;

        Ok(ParameterDescriptor {
            dataset_id: adapter.dataset_id().to_string(),
            time_range,
            spatial_selector,
            variable: non_empty(raw.variable),
            format: non_empty(raw.format).map(|value| value.to_ascii_lowercase()),
            output_directory,
            acknowledged: true,
        })
    }

    fn time_range(
        raw: &RawParameters,
        adapter: &dyn SourceAdapter,
    ) -> Result<Option<TimeRange>, GeoError> {
        let requested = raw
            .granularity
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(str::parse::<Granularity>)
            .transpose()?;

        let Some(native) = adapter.granularity() else {
            if let Some(requested) = requested {
                return Err(GeoError::invalid(
                    "granularity",
                    format!(
                        "{} has no temporal axis, got {requested}",
                        adapter.dataset_id()
                    ),
                ));
            }
            if raw.start.is_some() || raw.end.is_some() {
                debug!(
                    dataset = adapter.dataset_id(),
                    "ignoring dates for static dataset"
                );
            }
            return Ok(None);
        };

        if let Some(requested) = requested {
            if requested != native {
                return Err(GeoError::invalid(
                    "granularity",
                    format!(
                        "{} is published per {native}, not per {requested}",
                        adapter.dataset_id()
                    ),
                ));
            }
        }

        let start_raw = raw
            .start
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| GeoError::invalid("start", "start date is required"))?;
        let end_raw = raw
            .end
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(start_raw);

        let start = parse_date("start", start_raw, native, Bound::Start)?;
        let end = parse_date("end", end_raw, native, Bound::End)?;
        TimeRange::new(start, end, native).map(Some)
    }

    fn selector(
        raw: Option<&str>,
        adapter: &dyn SourceAdapter,
    ) -> Result<Option<SpatialSelector>, GeoError> {
        let parsed = raw
            .filter(|value| !value.trim().is_empty())
            .map(str::parse::<SpatialSelector>)
            .transpose()?;

        match (adapter.selector_kind(), parsed) {
            (SelectorKind::None, Some(selector)) => {
                warn!(
                    dataset = adapter.dataset_id(),
                    selector = %selector,
                    "dataset has no spatial selector; ignoring"
                );
                Ok(None)
            }
            (SelectorKind::None, None) => Ok(None),
            (kind, Some(selector)) if selector.kind() == kind => Ok(Some(selector)),
            (SelectorKind::Region, _) => Err(GeoError::invalid(
                "spatial_selector",
                format!("{} requires region:<code>", adapter.dataset_id()),
            )),
            (SelectorKind::BoundingBox, _) => Err(GeoError::invalid(
                "spatial_selector",
                format!(
                    "{} requires bbox:<min_lon>,<min_lat>,<max_lon>,<max_lat>",
                    adapter.dataset_id()
                ),
            )),
        }
    }

    fn output_directory(raw: Option<&str>) -> Result<Utf8PathBuf, GeoError> {
        let value = raw.unwrap_or(".");
        if value.trim().is_empty() {
            return Err(GeoError::invalid("output_directory", "path is empty"));
        }
        if value.contains(['\n', '\r']) {
            return Err(GeoError::invalid(
                "output_directory",
                "path contains a line break",
            ));
        }
        let path = Utf8PathBuf::from(value);
        if path.as_std_path().exists() && !path.as_std_path().is_dir() {
            return Err(GeoError::invalid(
                "output_directory",
                format!("{path} exists and is not a directory"),
            ));
        }
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Accepts `YYYY-MM-DD` / `YYYYMMDD`; month and year datasets also take
/// `YYYY-MM` / `YYYYMM` / `YYYY`, widened to the first or last day of the period.
fn parse_date(
    field: &'static str,
    value: &str,
    granularity: Granularity,
    bound: Bound,
) -> Result<NaiveDate, GeoError> {
    let trimmed = value.trim();
    let captures = DATE_LIKE
        .captures(trimmed)
        .ok_or_else(|| GeoError::invalid(field, format!("unparseable date `{trimmed}`")))?;
    let number = |index: usize| -> Option<u32> {
        captures
            .get(index)
            .and_then(|value| value.as_str().parse().ok())
    };
    let year = captures
        .get(1)
        .and_then(|value| value.as_str().parse::<i32>().ok())
        .ok_or_else(|| GeoError::invalid(field, format!("unparseable year in `{trimmed}`")))?;

    let unit = match (number(2), number(3)) {
        (Some(month), Some(day)) => {
            return NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| GeoError::invalid(field, format!("no such date `{trimmed}`")));
        }
        (Some(month), None) if granularity != Granularity::Day => {
            if !(1..=12).contains(&month) {
                return Err(GeoError::invalid(
                    field,
                    format!("no such month `{trimmed}`"),
                ));
            }
            TimeUnit::Month { year, month }
        }
        (None, None) if granularity == Granularity::Year => TimeUnit::Year(year),
        _ => {
            return Err(GeoError::invalid(
                field,
                format!("`{trimmed}` is not a full date for {granularity} data"),
            ));
        }
    };

    let widened = match bound {
        Bound::Start => unit.first_day(),
        Bound::End => unit.last_day(),
    };
    widened.ok_or_else(|| GeoError::invalid(field, format!("no such date `{trimmed}`")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn raw(dataset: &str, start: &str, end: &str) -> RawParameters {
        RawParameters {
            dataset: dataset.to_string(),
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            acknowledge: true,
            ..RawParameters::default()
        }
    }

    #[test]
    fn acknowledgement_checked_first() {
        let registry = Registry::with_defaults();
        let mut params = raw("no_such_dataset", "garbage", "");
        params.acknowledge = false;
        let err = Normalizer::normalize(params, &registry).unwrap_err();
        assert_matches!(err, GeoError::AcknowledgementRequired);
    }

    #[test]
    fn accepts_compact_and_dashed_dates() {
        let registry = Registry::with_defaults();
        let descriptor =
            Normalizer::normalize(raw("noaa_hms_smoke", "20231228", "2024-01-02"), &registry)
                .unwrap();
        let range = descriptor.time_range.unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2023, 12, 28).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(range.granularity(), Granularity::Day);
    }

    #[test]
    fn month_dates_widen_to_period() {
        let registry = Registry::with_defaults();
        let descriptor =
            Normalizer::normalize(raw("prism_monthly", "2020-02", "2020-04"), &registry).unwrap();
        let range = descriptor.time_range.unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2020, 4, 30).unwrap());
    }

    #[test]
    fn partial_date_rejected_for_daily_data() {
        let registry = Registry::with_defaults();
        let err =
            Normalizer::normalize(raw("noaa_hms_smoke", "2023-12", "2024-01-02"), &registry)
                .unwrap_err();
        assert_matches!(err, GeoError::InvalidParameter { field: "start", .. });
    }

    #[test]
    fn impossible_date_names_field() {
        let registry = Registry::with_defaults();
        let err =
            Normalizer::normalize(raw("noaa_hms_smoke", "2023-01-01", "2023-02-30"), &registry)
                .unwrap_err();
        assert_matches!(err, GeoError::InvalidParameter { field: "end", .. });
    }

    #[test]
    fn granularity_must_match_dataset() {
        let registry = Registry::with_defaults();
        let mut params = raw("gridmet", "2001", "2003");
        params.granularity = Some("day".to_string());
        let err = Normalizer::normalize(params, &registry).unwrap_err();
        assert_matches!(
            err,
            GeoError::InvalidParameter {
                field: "granularity",
                ..
            }
        );
    }

    #[test]
    fn static_dataset_requires_region() {
        let registry = Registry::with_defaults();
        let params = RawParameters {
            dataset: "gadm".to_string(),
            acknowledge: true,
            ..RawParameters::default()
        };
        let err = Normalizer::normalize(params, &registry).unwrap_err();
        assert_matches!(
            err,
            GeoError::InvalidParameter {
                field: "spatial_selector",
                ..
            }
        );
    }

    #[test]
    fn output_directory_must_not_be_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let registry = Registry::with_defaults();
        let mut params = raw("noaa_hms_smoke", "2023-01-01", "2023-01-01");
        params.output_directory = Some(file.to_string_lossy().to_string());
        let err = Normalizer::normalize(params, &registry).unwrap_err();
        assert_matches!(
            err,
            GeoError::InvalidParameter {
                field: "output_directory",
                ..
            }
        );
    }
}
