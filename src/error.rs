use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeoError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("large download not acknowledged; pass --acknowledge to proceed")]
    #[diagnostic(help("downloads can span hundreds of files; consent is required explicitly"))]
    AcknowledgementRequired,

    #[error("unknown dataset: {0}")]
    #[diagnostic(help("run `geofetch datasets` to list registered datasets"))]
    UnknownDataset(String),

    #[error("format `{format}` is not supported by dataset {dataset}")]
    UnsupportedFormat { dataset: String, format: String },

    #[error("failed to write manifest {path}: {reason}")]
    ManifestWrite { path: String, reason: String },

    #[error("failed to read manifest {path}: {reason}")]
    ManifestRead { path: String, reason: String },

    #[error("transfer failed for {url}: {reason}")]
    Transfer {
        url: String,
        reason: String,
        status: Option<u16>,
    },

    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("authentication required for dataset {dataset} ({url})")]
    #[diagnostic(help("configure `credentials_file` with a netrc entry for the archive host"))]
    AuthenticationRequired { dataset: String, url: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl GeoError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        GeoError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    /// Planning-stage errors abort the invocation before any side effect.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            GeoError::InvalidParameter { .. }
                | GeoError::AcknowledgementRequired
                | GeoError::UnknownDataset(_)
                | GeoError::UnsupportedFormat { .. }
        )
    }
}
