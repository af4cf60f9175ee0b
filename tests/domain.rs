use assert_matches::assert_matches;

use geofetch::domain::{BoundingBox, Granularity, SpatialSelector, TransferMethod};
use geofetch::error::GeoError;

#[test]
fn parse_granularity_aliases() {
    assert_eq!("daily".parse::<Granularity>().unwrap(), Granularity::Day);
    assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
    assert_eq!("annual".parse::<Granularity>().unwrap(), Granularity::Year);
    let err = "hourly".parse::<Granularity>().unwrap_err();
    assert_matches!(err, GeoError::InvalidParameter { field: "granularity", .. });
}

#[test]
fn parse_region_selector_forms() {
    let explicit: SpatialSelector = "region:NZL".parse().unwrap();
    let bare: SpatialSelector = "NZL".parse().unwrap();
    assert_eq!(explicit, bare);
    assert_eq!(explicit.region(), Some("NZL"));
    assert!("region:".parse::<SpatialSelector>().is_err());
    assert!("polygon:1,2".parse::<SpatialSelector>().is_err());
}

#[test]
fn parse_bbox_validates_extent() {
    let bbox: BoundingBox = "-124.5, 32, -114, 42".parse().unwrap();
    assert_eq!(bbox.min_lon, -124.5);
    assert_eq!(bbox.max_lat, 42.0);

    for bad in ["1,2,3", "10,0,5,1", "0,-95,1,1", "a,b,c,d"] {
        let err = bad.parse::<BoundingBox>().unwrap_err();
        assert_matches!(err, GeoError::InvalidParameter { field: "spatial_selector", .. });
    }
}

#[test]
fn transfer_method_names() {
    assert_eq!("wget".parse::<TransferMethod>().unwrap(), TransferMethod::Wget);
    assert!("scp".parse::<TransferMethod>().is_err());
    assert!("WGET".parse::<TransferMethod>().is_err());
}
