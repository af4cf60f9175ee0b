use chrono::Datelike;

use crate::domain::{Granularity, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, day_of, unsupported};

const GESDISC_BASE: &str = "https://goldsmr4.gesdisc.eosdis.nasa.gov/data/MERRA2/M2T1NXSLV.5.12.4";

/// MERRA-2 hourly single-level diagnostics (tavg1_2d_slv_Nx), one file per day.
///
/// Served behind NASA Earthdata login; the transfer tool needs a netrc entry
/// for `urs.earthdata.nasa.gov`.
#[derive(Debug, Clone, Copy)]
pub struct Merra2SingleLevel;

impl SourceAdapter for Merra2SingleLevel {
    fn dataset_id(&self) -> &'static str {
        "merra2_slv"
    }

    fn description(&self) -> &'static str {
        "MERRA-2 hourly single-level diagnostics (daily files, Earthdata login)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "merra2_slv"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Day)
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn formats(&self) -> &'static [&'static str] {
        &["nc4"]
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let day = day_of(unit)?;
        Ok(format!(
            "{GESDISC_BASE}/{}/{}/{}",
            day.format("%Y"),
            day.format("%m"),
            self.name_for(unit, request)?
        ))
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        if request.format != "nc4" {
            return Err(unsupported(self, request.format));
        }
        let day = day_of(unit)?;
        Ok(format!(
            "MERRA2_{}.tavg1_2d_slv_Nx.{}.nc4",
            production_stream(day.year()),
            day.format("%Y%m%d")
        ))
    }
}

/// File-name stream number, which follows the production decade.
fn production_stream(year: i32) -> u16 {
    match year {
        ..=1991 => 100,
        1992..=2000 => 200,
        2001..=2010 => 300,
        _ => 400,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn stream_follows_decade() {
        assert_eq!(production_stream(1980), 100);
        assert_eq!(production_stream(1995), 200);
        assert_eq!(production_stream(2010), 300);
        assert_eq!(production_stream(2023), 400);
    }

    #[test]
    fn daily_url() {
        let request = UnitRequest {
            format: "nc4",
            variable: None,
            selector: None,
        };
        let unit = TimeUnit::Day(NaiveDate::from_ymd_opt(2005, 6, 1).unwrap());
        assert_eq!(
            Merra2SingleLevel.url_for(&unit, &request).unwrap(),
            "https://goldsmr4.gesdisc.eosdis.nasa.gov/data/MERRA2/M2T1NXSLV.5.12.4/2005/06/MERRA2_300.tavg1_2d_slv_Nx.20050601.nc4"
        );
    }
}
