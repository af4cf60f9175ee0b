use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::TransferMethod;
use crate::error::GeoError;
use crate::plan::CommandEntry;

static WGET_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ERROR (\d{3})").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferInfo {
    pub http_status: Option<u16>,
    pub bytes: u64,
}

/// Performs one transfer. Implementations must leave no file at
/// `entry.destination` when they fail.
pub trait TransferClient: Send + Sync {
    fn fetch(&self, entry: &CommandEntry, use_credentials: bool)
    -> Result<TransferInfo, GeoError>;
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub timeout: Duration,
    /// netrc-style `machine/login/password` file handed to the tool as-is.
    pub credentials_file: Option<PathBuf>,
    pub cookie_file: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            credentials_file: None,
            cookie_file: None,
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("geofetch/{}", env!("CARGO_PKG_VERSION"))
}

/// Shells out to curl or wget found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemTransferClient {
    curl: Option<PathBuf>,
    wget: Option<PathBuf>,
    settings: TransferSettings,
}

impl SystemTransferClient {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            curl: find_in_path("curl"),
            wget: find_in_path("wget"),
            settings,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    fn program(&self, method: TransferMethod) -> Result<&Path, GeoError> {
        let found = match method {
            TransferMethod::Curl => self.curl.as_deref(),
            TransferMethod::Wget => self.wget.as_deref(),
        };
        found.ok_or_else(|| GeoError::MissingTool(method.as_str().to_string()))
    }

    fn curl_args(&self, entry: &CommandEntry, part: &Path, use_credentials: bool) -> Vec<String> {
        let mut args: Vec<String> = TransferMethod::Curl
            .manifest_flags()
            .iter()
            .map(|flag| flag.to_string())
            .collect();
        args.extend([
            "--max-time".to_string(),
            self.settings.timeout.as_secs().max(1).to_string(),
            "--user-agent".to_string(),
            self.settings.user_agent.clone(),
            "--write-out".to_string(),
            "%{http_code}".to_string(),
        ]);
        if use_credentials {
            if let Some(netrc) = &self.settings.credentials_file {
                args.push("--netrc-file".to_string());
                args.push(netrc.to_string_lossy().to_string());
            }
            if let Some(cookies) = &self.settings.cookie_file {
                let cookies = cookies.to_string_lossy().to_string();
                args.extend([
                    "--cookie".to_string(),
                    cookies.clone(),
                    "--cookie-jar".to_string(),
                    cookies,
                ]);
            }
        }
        args.extend([
            "-o".to_string(),
            part.to_string_lossy().to_string(),
            "--url".to_string(),
            entry.url.clone(),
        ]);
        args
    }

    fn wget_args(&self, entry: &CommandEntry, part: &Path, use_credentials: bool) -> Vec<String> {
        let mut args = vec![
            "--no-verbose".to_string(),
            format!("--timeout={}", self.settings.timeout.as_secs().max(1)),
            "--tries=3".to_string(),
            format!("--user-agent={}", self.settings.user_agent),
        ];
        if use_credentials {
            if let Some(cookies) = &self.settings.cookie_file {
                let cookies = cookies.to_string_lossy();
                args.push(format!("--load-cookies={cookies}"));
                args.push(format!("--save-cookies={cookies}"));
                args.push("--keep-session-cookies".to_string());
            }
        }
        args.extend([
            "-O".to_string(),
            part.to_string_lossy().to_string(),
            entry.url.clone(),
        ]);
        args
    }
}

impl TransferClient for SystemTransferClient {
    fn fetch(
        &self,
        entry: &CommandEntry,
        use_credentials: bool,
    ) -> Result<TransferInfo, GeoError> {
        let program = self.program(entry.transfer_method)?;
        let destination = entry.destination.as_std_path();
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| GeoError::Filesystem(err.to_string()))?;
        }
        let part = part_path(&entry.destination);

        let args = match entry.transfer_method {
            TransferMethod::Curl => self.curl_args(entry, part.as_std_path(), use_credentials),
            TransferMethod::Wget => self.wget_args(entry, part.as_std_path(), use_credentials),
        };
        let mut cmd = Command::new(program);
        cmd.args(&args);
        if use_credentials && entry.transfer_method == TransferMethod::Wget {
            if let Some(netrc) = &self.settings.credentials_file {
                cmd.env("NETRC", netrc);
            }
        }
        debug!(tool = %entry.transfer_method, url = %entry.url, "spawning transfer");
        let output = cmd.output().map_err(|err| GeoError::Transfer {
            url: entry.url.clone(),
            reason: format!("failed to start {}: {err}", program.display()),
            status: None,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let http_status = http_status(entry.transfer_method, &stdout, &stderr);

        if !output.status.success() {
            let _ = fs::remove_file(part.as_std_path());
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", entry.transfer_method, output.status)
            } else {
                stderr
            };
            return Err(GeoError::Transfer {
                url: entry.url.clone(),
                reason,
                status: http_status,
            });
        }

        fs::rename(part.as_std_path(), destination)
            .map_err(|err| GeoError::Filesystem(format!("{}: {err}", entry.destination)))?;
        let bytes = fs::metadata(destination)
            .map(|meta| meta.len())
            .unwrap_or(0);
        Ok(TransferInfo { http_status, bytes })
    }
}

/// Final HTTP status reported by the tool. curl prints it via `--write-out`
/// (`000` when no response arrived); wget logs one `ERROR nnn` per failed hop.
fn http_status(method: TransferMethod, stdout: &str, stderr: &str) -> Option<u16> {
    match method {
        TransferMethod::Curl => stdout.trim().parse::<u16>().ok().filter(|code| *code != 0),
        TransferMethod::Wget => WGET_STATUS
            .captures_iter(stderr)
            .last()
            .and_then(|captures| captures.get(1))
            .and_then(|code| code.as_str().parse().ok()),
    }
}

/// In-flight download path next to the final destination.
pub fn part_path(destination: &Utf8PathBuf) -> Utf8PathBuf {
    let mut part = destination.clone().into_string();
    part.push_str(".part");
    Utf8PathBuf::from(part)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
