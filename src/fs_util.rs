use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::GeoError;

/// Extracts every file entry under `target_dir`, returning the written paths.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, GeoError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| GeoError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| GeoError::Filesystem(err.to_string()))?;

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| GeoError::Filesystem(err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(GeoError::Filesystem(
                "zip entry path traversal detected".to_string(),
            ));
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| GeoError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| GeoError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| GeoError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| GeoError::Filesystem(err.to_string()))?;
        written.push(entry_path);
    }
    Ok(written)
}

/// Reads every entry to the end so CRC mismatches surface before extraction.
pub fn validate_zip(zip_path: &Path) -> Result<(), GeoError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| GeoError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| GeoError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| GeoError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| GeoError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Decompresses a single-member gzip file to `target`.
pub fn gunzip(gz_path: &Path, target: &Path) -> Result<PathBuf, GeoError> {
    let file = fs::File::open(gz_path)
        .map_err(|err| GeoError::Filesystem(format!("open gzip {}: {err}", gz_path.display())))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| GeoError::Filesystem(err.to_string()))?;
    }
    let mut decoder = GzDecoder::new(file);
    let mut outfile =
        fs::File::create(target).map_err(|err| GeoError::Filesystem(err.to_string()))?;
    if let Err(err) = io::copy(&mut decoder, &mut outfile) {
        drop(outfile);
        let _ = fs::remove_file(target);
        return Err(GeoError::Filesystem(err.to_string()));
    }
    Ok(target.to_path_buf())
}

/// Login portals answer with a 200 HTML page where the archive should be.
pub fn looks_like_html(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(512);
    if file.take(512).read_to_end(&mut head).is_err() {
        return false;
    }
    let text = String::from_utf8_lossy(&head).trim_start().to_ascii_lowercase();
    text.starts_with("<!doctype html") || text.starts_with("<html")
}
