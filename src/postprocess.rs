use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GeoError;
use crate::fs_util::{extract_zip, gunzip, looks_like_html, validate_zip};
use crate::plan::CommandEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Gzip,
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "zip" => Some(ArchiveKind::Zip),
        "gz" => Some(ArchiveKind::Gzip),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    pub path: String,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unpacks downloaded archives and removes them afterwards, both on request.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    dataset: String,
}

impl PostProcessor {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }

    /// Extracts `entry.destination` into `target_dir`. Files that are not
    /// archives are left alone and yield nothing.
    ///
    /// The built-in datasets only ship `.zip` archives. Single-member `.gz`
    /// files are unpacked too, for adapters added through
    /// [`Registry::register`](crate::sources::Registry::register) whose
    /// archives publish gzip-compressed grids.
    pub fn unzip(
        &self,
        entry: &CommandEntry,
        target_dir: &Path,
        enabled: bool,
    ) -> Result<Vec<PathBuf>, GeoError> {
        let archive = entry.destination.as_std_path();
        if !enabled {
            return Ok(Vec::new());
        }
        let Some(kind) = archive_kind(archive) else {
            debug!(destination = %entry.destination, "not an archive");
            return Ok(Vec::new());
        };

        let result = match kind {
            ArchiveKind::Zip => {
                validate_zip(archive).and_then(|()| extract_zip(archive, target_dir))
            }
            ArchiveKind::Gzip => {
                let stem = archive
                    .file_stem()
                    .map(|stem| stem.to_os_string())
                    .unwrap_or_default();
                gunzip(archive, &target_dir.join(stem)).map(|path| vec![path])
            }
        };

        match result {
            Ok(written) => {
                info!(archive = %entry.destination, files = written.len(), "extracted");
                Ok(written)
            }
            Err(_) if looks_like_html(archive) => Err(GeoError::AuthenticationRequired {
                dataset: self.dataset.clone(),
                url: entry.url.clone(),
            }),
            Err(err) => Err(GeoError::Extraction {
                path: entry.destination.to_string(),
                reason: match err {
                    GeoError::Filesystem(reason) => reason,
                    other => other.to_string(),
                },
            }),
        }
    }

    /// Deletes the archives among `entries`; non-archives are never touched.
    pub fn cleanup(&self, entries: &[CommandEntry], enabled: bool) -> Vec<CleanupOutcome> {
        if !enabled {
            return Vec::new();
        }
        entries
            .iter()
            .filter(|entry| archive_kind(entry.destination.as_std_path()).is_some())
            .map(|entry| {
                let path = entry.destination.as_std_path();
                match fs::remove_file(path) {
                    Ok(()) => CleanupOutcome {
                        path: entry.destination.to_string(),
                        removed: true,
                        error: None,
                    },
                    Err(err) => {
                        warn!(archive = %entry.destination, error = %err, "cleanup failed");
                        CleanupOutcome {
                            path: entry.destination.to_string(),
                            removed: false,
                            error: Some(err.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}
