//! Per-archive download recipes.
//!
//! Each adapter knows how one remote archive names its files: the URL for a
//! time unit, the local file name, the tool used to fetch it, and which
//! formats, variables and spatial selectors it accepts. Shared code never
//! branches on a dataset id; new archives are added by registering an adapter.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::{
    BoundingBox, Granularity, SelectorKind, SpatialSelector, TimeUnit, TransferMethod,
};
use crate::error::GeoError;

pub mod census;
pub mod gadm;
pub mod gridmet;
pub mod merra2;
pub mod nasa_power;
pub mod noaa;
pub mod prism;

/// Resolved per-invocation inputs an adapter needs besides the time unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitRequest<'a> {
    pub format: &'a str,
    pub variable: Option<&'a str>,
    pub selector: Option<&'a SpatialSelector>,
}

impl<'a> UnitRequest<'a> {
    pub fn variable(&self) -> Result<&'a str, GeoError> {
        self.variable
            .ok_or_else(|| GeoError::invalid("variable", "dataset requires a variable"))
    }

    pub fn region(&self) -> Result<&'a str, GeoError> {
        self.selector
            .and_then(SpatialSelector::region)
            .ok_or_else(|| GeoError::invalid("spatial_selector", "dataset requires region:<code>"))
    }

    pub fn bbox(&self) -> Result<&'a BoundingBox, GeoError> {
        self.selector
            .and_then(SpatialSelector::bbox)
            .ok_or_else(|| GeoError::invalid("spatial_selector", "dataset requires bbox:<coords>"))
    }
}

pub trait SourceAdapter: Send + Sync {
    fn dataset_id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Leading component of manifest names.
    fn manifest_prefix(&self) -> &'static str;

    /// Native temporal resolution; `None` for a single static file.
    fn granularity(&self) -> Option<Granularity>;

    fn transfer_method(&self) -> TransferMethod {
        TransferMethod::Curl
    }

    fn requires_auth(&self) -> bool {
        false
    }

    /// Accepted format names; the first one is the default.
    fn formats(&self) -> &'static [&'static str];

    fn default_format(&self) -> Option<&'static str> {
        self.formats().first().copied()
    }

    /// Accepted variable names; the first one is the default. Empty when the
    /// archive has a single product per unit.
    fn variables(&self) -> &'static [&'static str] {
        &[]
    }

    fn selector_kind(&self) -> SelectorKind {
        SelectorKind::None
    }

    fn url_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError>;

    fn name_for(&self, unit: &TimeUnit, request: &UnitRequest<'_>) -> Result<String, GeoError>;
}

/// Read-only lookup table from dataset id to adapter.
pub struct Registry {
    adapters: BTreeMap<&'static str, Box<dyn SourceAdapter>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(noaa::HmsSmoke);
        registry.register(noaa::HmsFire);
        registry.register(prism::PrismDaily);
        registry.register(prism::PrismMonthly);
        registry.register(gridmet::Gridmet);
        registry.register(merra2::Merra2SingleLevel);
        registry.register(nasa_power::PowerDaily);
        registry.register(census::TigerCounties);
        registry.register(gadm::Gadm);
        registry
    }

    /// Registers an adapter, replacing any previous one with the same id.
    pub fn register<A: SourceAdapter + 'static>(&mut self, adapter: A) {
        self.adapters.insert(adapter.dataset_id(), Box::new(adapter));
    }

    pub fn lookup(&self, dataset_id: &str) -> Result<&dyn SourceAdapter, GeoError> {
        let key = dataset_id.trim().to_ascii_lowercase();
        self.adapters
            .get(key.as_str())
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| GeoError::UnknownDataset(dataset_id.to_string()))
    }

    /// Adapter whose manifest prefix starts `manifest_name`; the longest prefix wins.
    pub fn for_manifest(&self, manifest_name: &str) -> Option<&dyn SourceAdapter> {
        self.adapters()
            .filter(|adapter| {
                manifest_name
                    .strip_prefix(adapter.manifest_prefix())
                    .is_some_and(|rest| rest.starts_with('_'))
            })
            .max_by_key(|adapter| adapter.manifest_prefix().len())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn SourceAdapter> {
        self.adapters.values().map(|adapter| adapter.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub(crate) fn day_of(unit: &TimeUnit) -> Result<NaiveDate, GeoError> {
    match unit {
        TimeUnit::Day(date) => Ok(*date),
        other => Err(GeoError::invalid(
            "granularity",
            format!("expected a daily unit, got {other}"),
        )),
    }
}

pub(crate) fn year_of(unit: &TimeUnit) -> Result<i32, GeoError> {
    match unit {
        TimeUnit::Year(year) => Ok(*year),
        other => Err(GeoError::invalid(
            "granularity",
            format!("expected a yearly unit, got {other}"),
        )),
    }
}

pub(crate) fn month_of(unit: &TimeUnit) -> Result<(i32, u32), GeoError> {
    match unit {
        TimeUnit::Month { year, month } => Ok((*year, *month)),
        other => Err(GeoError::invalid(
            "granularity",
            format!("expected a monthly unit, got {other}"),
        )),
    }
}

pub(crate) fn unsupported(adapter: &dyn SourceAdapter, format: &str) -> GeoError {
    GeoError::UnsupportedFormat {
        dataset: adapter.dataset_id().to_string(),
        format: format.to_string(),
    }
}
