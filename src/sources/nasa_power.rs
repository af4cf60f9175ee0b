use reqwest::Url;

use crate::domain::{Granularity, SelectorKind, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, month_of, unsupported};

const POWER_REGIONAL: &str = "https://power.larc.nasa.gov/api/temporal/daily/regional";

/// NASA POWER daily regional time series, requested one calendar month at a time.
#[derive(Debug, Clone, Copy)]
pub struct PowerDaily;

impl PowerDaily {
    fn extension(&self, format: &str) -> Result<&'static str, GeoError> {
        match format {
            "csv" => Ok("csv"),
            "json" => Ok("json"),
            "netcdf" => Ok("nc"),
            other => Err(unsupported(self, other)),
        }
    }
}

impl SourceAdapter for PowerDaily {
    fn dataset_id(&self) -> &'static str {
        "nasa_power_daily"
    }

    fn description(&self) -> &'static str {
        "NASA POWER daily meteorology over a bounding box (monthly requests)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "power_daily"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Month)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["csv", "json", "netcdf"]
    }

    fn variables(&self) -> &'static [&'static str] {
        &[
            "T2M",
            "T2M_MAX",
            "T2M_MIN",
            "PRECTOTCORR",
            "RH2M",
            "WS2M",
            "ALLSKY_SFC_SW_DWN",
        ]
    }

    fn selector_kind(&self) -> SelectorKind {
        SelectorKind::BoundingBox
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        self.extension(request.format)?;
        month_of(unit)?;
        let (Some(first), Some(last)) = (unit.first_day(), unit.last_day()) else {
            return Err(GeoError::invalid("start", format!("invalid month {unit}")));
        };
        let bbox = request.bbox()?;
        let params = [
            ("parameters", request.variable()?.to_string()),
            ("community", "RE".to_string()),
            ("longitude-min", bbox.min_lon.to_string()),
            ("longitude-max", bbox.max_lon.to_string()),
            ("latitude-min", bbox.min_lat.to_string()),
            ("latitude-max", bbox.max_lat.to_string()),
            ("start", first.format("%Y%m%d").to_string()),
            ("end", last.format("%Y%m%d").to_string()),
            ("format", request.format.to_ascii_uppercase()),
        ];
        let url = Url::parse_with_params(POWER_REGIONAL, &params)
            .map_err(|err| GeoError::invalid("spatial_selector", err.to_string()))?;
        Ok(url.to_string())
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let ext = self.extension(request.format)?;
        let (year, month) = month_of(unit)?;
        Ok(format!(
            "power_{}_{year:04}{month:02}.{ext}",
            request.variable()?.to_ascii_lowercase()
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::SpatialSelector;

    use super::*;

    #[test]
    fn url_spans_whole_month() {
        let selector: SpatialSelector = "bbox:-110,35,-105,40".parse().unwrap();
        let request = UnitRequest {
            format: "csv",
            variable: Some("T2M"),
            selector: Some(&selector),
        };
        let unit = TimeUnit::Month {
            year: 2024,
            month: 2,
        };
        let url = PowerDaily.url_for(&unit, &request).unwrap();
        assert!(url.starts_with(POWER_REGIONAL));
        assert!(url.contains("start=20240201"));
        assert!(url.contains("end=20240229"));
        assert!(url.contains("longitude-min=-110"));
        assert!(url.contains("format=CSV"));
        assert_eq!(
            PowerDaily.name_for(&unit, &request).unwrap(),
            "power_t2m_202402.csv"
        );
    }

    #[test]
    fn missing_bbox_rejected() {
        let request = UnitRequest {
            format: "csv",
            variable: Some("T2M"),
            selector: None,
        };
        let unit = TimeUnit::Month {
            year: 2024,
            month: 2,
        };
        assert!(PowerDaily.url_for(&unit, &request).is_err());
    }
}
