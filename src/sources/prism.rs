use crate::domain::{Granularity, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, day_of, month_of, unsupported};

const PRISM_BASE: &str = "https://services.nacse.org/prism/data/public/4km";
const PRISM_VARIABLES: &[&str] = &["ppt", "tmean", "tmin", "tmax", "tdmean", "vpdmin", "vpdmax"];

/// PRISM 4km daily grids for the conterminous US.
#[derive(Debug, Clone, Copy)]
pub struct PrismDaily;

/// PRISM 4km monthly grids for the conterminous US.
#[derive(Debug, Clone, Copy)]
pub struct PrismMonthly;

impl SourceAdapter for PrismDaily {
    fn dataset_id(&self) -> &'static str {
        "prism_daily"
    }

    fn description(&self) -> &'static str {
        "PRISM 4km climate grids (daily)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "prism_daily"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Day)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["bil"]
    }

    fn variables(&self) -> &'static [&'static str] {
        PRISM_VARIABLES
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        check_format(self, request)?;
        let stamp = day_of(unit)?.format("%Y%m%d");
        Ok(format!("{PRISM_BASE}/{}/{stamp}", request.variable()?))
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        check_format(self, request)?;
        let stamp = day_of(unit)?.format("%Y%m%d");
        Ok(format!("prism_{}_4km_{stamp}.zip", request.variable()?))
    }
}

impl SourceAdapter for PrismMonthly {
    fn dataset_id(&self) -> &'static str {
        "prism_monthly"
    }

    fn description(&self) -> &'static str {
        "PRISM 4km climate grids (monthly)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "prism_monthly"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Month)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["bil"]
    }

    fn variables(&self) -> &'static [&'static str] {
        PRISM_VARIABLES
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        check_format(self, request)?;
        let (year, month) = month_of(unit)?;
        Ok(format!(
            "{PRISM_BASE}/{}/{year:04}{month:02}",
            request.variable()?
        ))
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        check_format(self, request)?;
        let (year, month) = month_of(unit)?;
        Ok(format!(
            "prism_{}_4km_{year:04}{month:02}.zip",
            request.variable()?
        ))
    }
}

fn check_format(adapter: &dyn SourceAdapter, request: &UnitRequest<'_>) -> Result<(), GeoError> {
    if request.format == "bil" {
        Ok(())
    } else {
        Err(unsupported(adapter, request.format))
    }
}
