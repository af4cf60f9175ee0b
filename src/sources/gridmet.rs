use crate::domain::{Granularity, TimeUnit, TransferMethod};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, unsupported, year_of};

const GRIDMET_BASE: &str = "https://www.northwestknowledge.net/metdata/data";

/// gridMET surface meteorology, one NetCDF file per variable and year.
#[derive(Debug, Clone, Copy)]
pub struct Gridmet;

impl SourceAdapter for Gridmet {
    fn dataset_id(&self) -> &'static str {
        "gridmet"
    }

    fn description(&self) -> &'static str {
        "gridMET 4km surface meteorology (yearly files)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "gridmet"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Year)
    }

    fn transfer_method(&self) -> TransferMethod {
        TransferMethod::Wget
    }

    fn formats(&self) -> &'static [&'static str] {
        &["netcdf"]
    }

    fn variables(&self) -> &'static [&'static str] {
        &[
            "pr", "tmmn", "tmmx", "rmax", "rmin", "sph", "srad", "vs", "th", "erc", "bi",
            "fm100", "fm1000", "pet", "etr", "vpd",
        ]
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        Ok(format!("{GRIDMET_BASE}/{}", self.name_for(unit, request)?))
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        if request.format != "netcdf" {
            return Err(unsupported(self, request.format));
        }
        Ok(format!("{}_{:04}.nc", request.variable()?, year_of(unit)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yearly_url() {
        let request = UnitRequest {
            format: "netcdf",
            variable: Some("pr"),
            selector: None,
        };
        assert_eq!(
            Gridmet.url_for(&TimeUnit::Year(1999), &request).unwrap(),
            "https://www.northwestknowledge.net/metdata/data/pr_1999.nc"
        );
    }
}
