use crate::domain::{Granularity, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, unsupported, year_of};

const TIGER_BASE: &str = "https://www2.census.gov/geo/tiger";

/// US Census TIGER/Line county boundaries, one national file per vintage year.
#[derive(Debug, Clone, Copy)]
pub struct TigerCounties;

impl SourceAdapter for TigerCounties {
    fn dataset_id(&self) -> &'static str {
        "tiger_counties"
    }

    fn description(&self) -> &'static str {
        "US Census TIGER/Line county boundaries (yearly vintages)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "tiger_counties"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Year)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["shapefile"]
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let name = self.name_for(unit, request)?;
        Ok(format!("{TIGER_BASE}/TIGER{:04}/COUNTY/{name}", year_of(unit)?))
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        if request.format != "shapefile" {
            return Err(unsupported(self, request.format));
        }
        Ok(format!("tl_{:04}_us_county.zip", year_of(unit)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vintage_url() {
        let request = UnitRequest {
            format: "shapefile",
            variable: None,
            selector: None,
        };
        assert_eq!(
            TigerCounties
                .url_for(&TimeUnit::Year(2022), &request)
                .unwrap(),
            "https://www2.census.gov/geo/tiger/TIGER2022/COUNTY/tl_2022_us_county.zip"
        );
    }
}
