use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::executor::ExistingPolicy;
use crate::transfer::{TransferSettings, default_user_agent};

pub const DEFAULT_CONFIG_FILE: &str = "geofetch.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// netrc file with archive logins; defaults to `~/.netrc` when present.
    #[serde(default)]
    pub credentials_file: Option<String>,
    #[serde(default)]
    pub cookie_file: Option<String>,
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub existing: Option<ExistingPolicy>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub credentials_file: Option<PathBuf>,
    pub cookie_file: Option<PathBuf>,
    pub transfer_timeout: Duration,
    pub probe_timeout: Duration,
    pub workers: usize,
    pub existing: ExistingPolicy,
    pub user_agent: String,
}

impl ResolvedConfig {
    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            timeout: self.transfer_timeout,
            credentials_file: self.credentials_file.clone(),
            cookie_file: self.cookie_file.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            credentials_file: None,
            cookie_file: None,
            transfer_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            workers: 1,
            existing: ExistingPolicy::SkipExisting,
            user_agent: default_user_agent(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Explicit path, else `./geofetch.json` when present, else defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GeoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GeoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GeoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GeoError> {
        let defaults = ResolvedConfig::default();
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(GeoError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let workers = config.workers.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(GeoError::ConfigParse("workers must be at least 1".to_string()));
        }
        let transfer_timeout = positive_secs("transfer_timeout_secs", config.transfer_timeout_secs)?
            .unwrap_or(defaults.transfer_timeout);
        let probe_timeout = positive_secs("probe_timeout_secs", config.probe_timeout_secs)?
            .unwrap_or(defaults.probe_timeout);

        let credentials_file = match config.credentials_file {
            Some(path) => Some(expand_home(&path)),
            None => default_credentials_file(),
        };
        let cookie_file = match config.cookie_file {
            Some(path) => Some(expand_home(&path)),
            None => credentials_file.as_ref().and(default_cookie_file()),
        };

        Ok(ResolvedConfig {
            schema_version,
            credentials_file,
            cookie_file,
            transfer_timeout,
            probe_timeout,
            workers,
            existing: config.existing.unwrap_or(defaults.existing),
            user_agent: config
                .user_agent
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        })
    }
}

fn positive_secs(field: &str, value: Option<u64>) -> Result<Option<Duration>, GeoError> {
    match value {
        Some(0) => Err(GeoError::ConfigParse(format!("{field} must be positive"))),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

/// `~/.netrc` if it exists. Resolved from the home directory only.
pub fn default_credentials_file() -> Option<PathBuf> {
    let dirs = BaseDirs::new()?;
    let netrc = dirs.home_dir().join(".netrc");
    netrc.is_file().then_some(netrc)
}

fn default_cookie_file() -> Option<PathBuf> {
    let dirs = BaseDirs::new()?;
    Some(dirs.cache_dir().join("geofetch").join("cookies.txt"))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), BaseDirs::new()) {
        (Some(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.workers, 1);
        assert_eq!(resolved.transfer_timeout, Duration::from_secs(600));
        assert_eq!(resolved.probe_timeout, Duration::from_secs(30));
        assert_eq!(resolved.existing, ExistingPolicy::SkipExisting);
        assert!(resolved.user_agent.starts_with("geofetch/"));
    }

    #[test]
    fn rejects_zero_workers_and_timeouts() {
        let config = Config {
            workers: Some(0),
            ..Config::default()
        };
        assert!(ConfigLoader::resolve_config(config).is_err());
        let config = Config {
            probe_timeout_secs: Some(0),
            ..Config::default()
        };
        assert!(ConfigLoader::resolve_config(config).is_err());
    }

    #[test]
    fn explicit_credentials_win() {
        let config = Config {
            credentials_file: Some("/etc/geofetch/netrc".to_string()),
            cookie_file: Some("/tmp/jar".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(
            resolved.credentials_file,
            Some(PathBuf::from("/etc/geofetch/netrc"))
        );
        assert_eq!(
            resolved.transfer_settings().cookie_file,
            Some(PathBuf::from("/tmp/jar"))
        );
    }
}
