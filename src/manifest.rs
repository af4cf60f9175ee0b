//! Durable, inspectable command manifests.
//!
//! One line per entry, in the fixed order
//! `<tool> <flags> -o <destination> --url <source-url>`. Tokens holding
//! whitespace or shell metacharacters are single-quoted so the file stays
//! runnable by hand and splittable by the reader below.

use std::fmt;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::domain::TransferMethod;
use crate::error::GeoError;
use crate::plan::{CommandEntry, CommandManifest};

pub const MANIFEST_EXTENSION: &str = "txt";

/// Location of a persisted manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestHandle(Utf8PathBuf);

impl ManifestHandle {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.0
    }

    /// Manifest name: the file stem.
    pub fn name(&self) -> &str {
        self.0.file_stem().unwrap_or_default()
    }
}

impl fmt::Display for ManifestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ManifestStore {
    directory: Utf8PathBuf,
}

impl ManifestStore {
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    pub fn handle_for(&self, name: &str) -> ManifestHandle {
        ManifestHandle(
            self.directory
                .join(format!("{name}.{MANIFEST_EXTENSION}")),
        )
    }

    /// Writes the whole manifest or nothing: content goes to a temp file in
    /// the target directory which is then renamed over the final path.
    pub fn write(&self, manifest: &CommandManifest) -> Result<ManifestHandle, GeoError> {
        let handle = self.handle_for(&manifest.name);
        let write_err = |reason: String| GeoError::ManifestWrite {
            path: handle.to_string(),
            reason,
        };
        if manifest.is_empty() {
            return Err(write_err("manifest has no entries".to_string()));
        }

        fs::create_dir_all(self.directory.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}", manifest.name))
            .suffix(".tmp")
            .tempfile_in(self.directory.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        for entry in &manifest.entries {
            writeln!(temp, "{}", render_line(entry)).map_err(|err| write_err(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(handle.path().as_std_path())
            .map_err(|err| write_err(err.to_string()))?;

        info!(manifest = %handle, entries = manifest.len(), "wrote manifest");
        Ok(handle)
    }

    pub fn read(handle: &ManifestHandle) -> Result<CommandManifest, GeoError> {
        let read_err = |reason: String| GeoError::ManifestRead {
            path: handle.to_string(),
            reason,
        };
        let content = fs::read_to_string(handle.path().as_std_path())
            .map_err(|err| read_err(err.to_string()))?;

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let entry = parse_line(trimmed)
                .map_err(|reason| read_err(format!("line {}: {reason}", index + 1)))?;
            entries.push(entry);
        }
        if entries.is_empty() {
            return Err(read_err("no commands found".to_string()));
        }

        Ok(CommandManifest {
            name: handle.name().to_string(),
            entries,
        })
    }

    pub fn remove(handle: &ManifestHandle) -> Result<(), GeoError> {
        if handle.path().as_std_path().exists() {
            fs::remove_file(handle.path().as_std_path())
                .map_err(|err| GeoError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }
}

pub fn render_line(entry: &CommandEntry) -> String {
    let mut tokens = vec![entry.transfer_method.as_str().to_string()];
    tokens.extend(
        entry
            .transfer_method
            .manifest_flags()
            .iter()
            .map(|flag| flag.to_string()),
    );
    tokens.push("-o".to_string());
    tokens.push(quote(entry.destination.as_str()));
    tokens.push("--url".to_string());
    tokens.push(quote(&entry.url));
    tokens.join(" ")
}

pub fn parse_line(line: &str) -> Result<CommandEntry, String> {
    let tokens = split_tokens(line)?;
    let (tool, rest) = tokens
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;
    let transfer_method = tool
        .parse::<TransferMethod>()
        .map_err(|err| err.to_string())?;

    let output_at = rest
        .iter()
        .position(|token| token == "-o")
        .ok_or_else(|| "missing -o <destination>".to_string())?;
    let url_at = rest
        .iter()
        .position(|token| token == "--url")
        .ok_or_else(|| "missing --url <source-url>".to_string())?;
    if url_at < output_at {
        return Err("--url must follow -o".to_string());
    }
    if url_at + 2 != rest.len() {
        return Err("--url <source-url> must end the command".to_string());
    }
    let destination = rest
        .get(output_at + 1)
        .filter(|_| output_at + 1 < url_at)
        .ok_or_else(|| "missing destination after -o".to_string())?;
    let url = &rest[url_at + 1];

    Ok(CommandEntry {
        url: url.clone(),
        destination: Utf8PathBuf::from(destination),
        transfer_method,
    })
}

fn is_plain(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(ch, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '@' | '%' | '+' | '~')
}

fn quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_plain) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}

fn split_tokens(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err("unterminated quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                let escaped = chars
                    .next()
                    .ok_or_else(|| "dangling escape".to_string())?;
                current.push(escaped);
            }
            ch if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            ch => {
                in_token = true;
                current.push(ch);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, destination: &str, method: TransferMethod) -> CommandEntry {
        CommandEntry {
            url: url.to_string(),
            destination: Utf8PathBuf::from(destination),
            transfer_method: method,
        }
    }

    #[test]
    fn curl_line_layout() {
        let line = render_line(&entry(
            "https://example.org/hms_smoke20231228.zip",
            "out/hms_smoke20231228.zip",
            TransferMethod::Curl,
        ));
        assert_eq!(
            line,
            "curl --fail --location --silent --show-error --create-dirs -o out/hms_smoke20231228.zip --url https://example.org/hms_smoke20231228.zip"
        );
    }

    #[test]
    fn query_strings_and_spaces_survive() {
        let original = entry(
            "https://power.example/api?parameters=T2M&start=20240101",
            "my data/it's here.csv",
            TransferMethod::Wget,
        );
        let line = render_line(&original);
        assert!(line.contains("'https://power.example/api?parameters=T2M&start=20240101'"));
        assert_eq!(parse_line(&line).unwrap(), original);
    }

    #[test]
    fn rejects_out_of_order_arguments() {
        let err = parse_line("curl --url https://example.org/a -o out/a").unwrap_err();
        assert!(err.contains("--url"));
        assert!(parse_line("scp -o a --url b").is_err());
        assert!(parse_line("curl -o 'unterminated --url b").is_err());
    }
}
