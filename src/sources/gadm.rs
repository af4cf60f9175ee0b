use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Granularity, SelectorKind, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, unsupported};

const GADM_BASE: &str = "https://geodata.ucdavis.edu/gadm/gadm4.1";

static ISO3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid regex"));

/// GADM 4.1 administrative boundaries for one country. No temporal axis.
#[derive(Debug, Clone, Copy)]
pub struct Gadm;

impl Gadm {
    fn country(request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let code = request.region()?.to_ascii_uppercase();
        if !ISO3.is_match(&code) {
            return Err(GeoError::invalid(
                "spatial_selector",
                format!("expected an ISO 3166 alpha-3 country code, got `{code}`"),
            ));
        }
        Ok(code)
    }
}

impl SourceAdapter for Gadm {
    fn dataset_id(&self) -> &'static str {
        "gadm"
    }

    fn description(&self) -> &'static str {
        "GADM 4.1 administrative boundaries (per country, static)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "gadm41"
    }

    fn granularity(&self) -> Option<Granularity> {
        None
    }

    fn formats(&self) -> &'static [&'static str] {
        &["shapefile", "gpkg"]
    }

    fn selector_kind(&self) -> SelectorKind {
        SelectorKind::Region
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let folder = match request.format {
            "shapefile" => "shp",
            "gpkg" => "gpkg",
            other => return Err(unsupported(self, other)),
        };
        Ok(format!(
            "{GADM_BASE}/{folder}/{}",
            self.name_for(unit, request)?
        ))
    }

    fn name_for(&self, _unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let country = Self::country(request)?;
        match request.format {
            "shapefile" => Ok(format!("gadm41_{country}_shp.zip")),
            "gpkg" => Ok(format!("gadm41_{country}.gpkg")),
            other => Err(unsupported(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::domain::SpatialSelector;

    use super::*;

    #[test]
    fn country_urls() {
        let selector = SpatialSelector::Region("fra".to_string());
        let shp = UnitRequest {
            format: "shapefile",
            variable: None,
            selector: Some(&selector),
        };
        assert_eq!(
            Gadm.url_for(&TimeUnit::Static, &shp).unwrap(),
            "https://geodata.ucdavis.edu/gadm/gadm4.1/shp/gadm41_FRA_shp.zip"
        );
        let gpkg = UnitRequest {
            format: "gpkg",
            ..shp
        };
        assert_eq!(
            Gadm.name_for(&TimeUnit::Static, &gpkg).unwrap(),
            "gadm41_FRA.gpkg"
        );
    }

    #[test]
    fn rejects_non_iso3_codes() {
        let selector = SpatialSelector::Region("h08v05".to_string());
        let request = UnitRequest {
            format: "gpkg",
            variable: None,
            selector: Some(&selector),
        };
        let err = Gadm.name_for(&TimeUnit::Static, &request).unwrap_err();
        assert_matches!(
            err,
            GeoError::InvalidParameter {
                field: "spatial_selector",
                ..
            }
        );
    }
}
