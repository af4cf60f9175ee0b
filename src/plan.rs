use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::domain::{SpatialSelector, TimeUnit, TransferMethod};
use crate::error::GeoError;
use crate::params::ParameterDescriptor;
use crate::sources::{SourceAdapter, UnitRequest};

/// One atomic transfer: fetch `url` into `destination` with `transfer_method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandEntry {
    pub url: String,
    pub destination: Utf8PathBuf,
    pub transfer_method: TransferMethod,
}

/// Ordered transfer plan for one invocation.
///
/// Entries are in ascending time order, so an interrupted run can resume from
/// the first destination that is still missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandManifest {
    pub name: String,
    pub entries: Vec<CommandEntry>,
}

impl CommandManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry whose destination is not on disk yet.
    pub fn resume_point(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.destination.as_std_path().exists())
    }
}

pub struct PlanBuilder;

impl PlanBuilder {
    pub fn build(
        descriptor: &ParameterDescriptor,
        adapter: &dyn SourceAdapter,
    ) -> Result<CommandManifest, GeoError> {
        let format = resolve_format(descriptor, adapter)?;
        let variable = resolve_variable(descriptor, adapter)?;

        let units = match (adapter.granularity(), descriptor.time_range) {
            (None, _) => vec![TimeUnit::Static],
            (Some(native), Some(range)) if range.granularity() == native => range.units(),
            (Some(native), Some(range)) => {
                return Err(GeoError::invalid(
                    "granularity",
                    format!(
                        "{} is published per {native}, not per {}",
                        adapter.dataset_id(),
                        range.granularity()
                    ),
                ));
            }
            (Some(_), None) => {
                return Err(GeoError::invalid(
                    "start",
                    format!("{} needs a time range", adapter.dataset_id()),
                ));
            }
        };

        let request = UnitRequest {
            format,
            variable,
            selector: descriptor.spatial_selector.as_ref(),
        };
        let transfer_method = adapter.transfer_method();
        let entries = units
            .iter()
            .map(|unit| -> Result<CommandEntry, GeoError> {
                let entry = CommandEntry {
                    url: adapter.url_for(unit, &request)?,
                    destination: descriptor
                        .output_directory
                        .join(adapter.name_for(unit, &request)?),
                    transfer_method,
                };
                debug!(unit = %unit, url = %entry.url, "planned transfer");
                Ok(entry)
            })
            .collect::<Result<Vec<_>, GeoError>>()?;

        let name = manifest_name(adapter, descriptor, variable, &units, transfer_method);
        info!(
            dataset = adapter.dataset_id(),
            manifest = %name,
            entries = entries.len(),
            "built transfer plan"
        );
        Ok(CommandManifest { name, entries })
    }
}

fn resolve_format(
    descriptor: &ParameterDescriptor,
    adapter: &dyn SourceAdapter,
) -> Result<&'static str, GeoError> {
    let unsupported = |format: &str| GeoError::UnsupportedFormat {
        dataset: adapter.dataset_id().to_string(),
        format: format.to_string(),
    };
    match descriptor.format.as_deref() {
        Some(requested) => adapter
            .formats()
            .iter()
            .copied()
            .find(|format| format.eq_ignore_ascii_case(requested))
            .ok_or_else(|| unsupported(requested)),
        None => adapter.default_format().ok_or_else(|| unsupported("")),
    }
}

fn resolve_variable(
    descriptor: &ParameterDescriptor,
    adapter: &dyn SourceAdapter,
) -> Result<Option<&'static str>, GeoError> {
    let known = adapter.variables();
    match (known.first(), descriptor.variable.as_deref()) {
        (None, Some(requested)) => {
            warn!(
                dataset = adapter.dataset_id(),
                variable = requested,
                "dataset has a single product; ignoring variable"
            );
            Ok(None)
        }
        (None, None) => Ok(None),
        (Some(default), None) => Ok(Some(*default)),
        (Some(_), Some(requested)) => known
            .iter()
            .copied()
            .find(|name| name.eq_ignore_ascii_case(requested))
            .map(Some)
            .ok_or_else(|| {
                GeoError::invalid(
                    "variable",
                    format!(
                        "`{requested}` is not one of {} for {}",
                        known.join("|"),
                        adapter.dataset_id()
                    ),
                )
            }),
    }
}

/// `{prefix}[_{variable}][_{selector}][_{first}_{last}]_{tool}_commands`
fn manifest_name(
    adapter: &dyn SourceAdapter,
    descriptor: &ParameterDescriptor,
    variable: Option<&str>,
    units: &[TimeUnit],
    method: TransferMethod,
) -> String {
    let mut parts = vec![adapter.manifest_prefix().to_string()];
    if let Some(variable) = variable {
        parts.push(variable.to_ascii_lowercase());
    }
    match &descriptor.spatial_selector {
        Some(SpatialSelector::Region(code)) => parts.push(code.to_ascii_uppercase()),
        Some(SpatialSelector::BoundingBox(bbox)) => parts.push(format!(
            "bbox_{}_{}_{}_{}",
            bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
        )),
        None => {}
    }
    if let (Some(first), Some(last)) = (units.first(), units.last()) {
        if *first != TimeUnit::Static {
            parts.push(first.stamp());
            parts.push(last.stamp());
        }
    }
    parts.push(method.as_str().to_string());
    parts.push("commands".to_string());
    parts.join("_")
}
