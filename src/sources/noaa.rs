use crate::domain::{Granularity, TimeUnit};
use crate::error::GeoError;
use crate::sources::{SourceAdapter, UnitRequest, day_of, unsupported};

const HMS_BASE: &str = "https://satepsanone.nesdis.noaa.gov/pub/FIRE/web/HMS";

/// NOAA Hazard Mapping System smoke polygons, one file per day.
#[derive(Debug, Clone, Copy)]
pub struct HmsSmoke;

/// NOAA Hazard Mapping System fire detections, one file per day.
#[derive(Debug, Clone, Copy)]
pub struct HmsFire;

impl SourceAdapter for HmsSmoke {
    fn dataset_id(&self) -> &'static str {
        "noaa_hms_smoke"
    }

    fn description(&self) -> &'static str {
        "NOAA HMS analyst smoke polygons (daily)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "hms_smoke"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Day)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["shapefile", "kml"]
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let (folder, ext) = match request.format {
            "shapefile" => ("Shapefile", "zip"),
            "kml" => ("KML", "kml"),
            other => return Err(unsupported(self, other)),
        };
        hms_url("Smoke_Polygons", folder, "hms_smoke", unit, ext)
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let ext = match request.format {
            "shapefile" => "zip",
            "kml" => "kml",
            other => return Err(unsupported(self, other)),
        };
        Ok(format!("hms_smoke{}.{ext}", day_of(unit)?.format("%Y%m%d")))
    }
}

impl SourceAdapter for HmsFire {
    fn dataset_id(&self) -> &'static str {
        "noaa_hms_fire"
    }

    fn description(&self) -> &'static str {
        "NOAA HMS satellite fire detections (daily)"
    }

    fn manifest_prefix(&self) -> &'static str {
        "hms_fire"
    }

    fn granularity(&self) -> Option<Granularity> {
        Some(Granularity::Day)
    }

    fn formats(&self) -> &'static [&'static str] {
        &["shapefile", "text"]
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let (folder, ext) = match request.format {
            "shapefile" => ("Shapefile", "zip"),
            "text" => ("Text", "txt"),
            other => return Err(unsupported(self, other)),
        };
        hms_url("Fire_Points", folder, "hms_fire", unit, ext)
    }

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError> {
        let ext = match request.format {
            "shapefile" => "zip",
            "text" => "txt",
            other => return Err(unsupported(self, other)),
        };
        Ok(format!("hms_fire{}.{ext}", day_of(unit)?.format("%Y%m%d")))
    }
}

fn hms_url(
    product: &str,
    folder: &str,
    stem: &str,
    unit: &TimeUnit,
    ext: &str,
) -> Result<String, GeoError> {
    let day = day_of(unit)?;
    Ok(format!(
        "{HMS_BASE}/{product}/{folder}/{}/{}/{stem}{}.{ext}",
        day.format("%Y"),
        day.format("%m"),
        day.format("%Y%m%d"),
    ))
}
