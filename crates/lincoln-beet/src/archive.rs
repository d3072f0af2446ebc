// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

use crate::Error;
use log::{debug, info, warn};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Directory an archive unpacks into: a sibling named after the archive
/// without its extension.
pub fn unpacked_dir(archive: &Path) -> PathBuf {
    match archive.file_stem() {
        Some(stem) => archive.with_file_name(stem),
        None => archive.to_path_buf(),
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Extracts `path` if it is a zip archive and returns the extracted
/// directory, otherwise returns `path` unchanged.
///
/// Only zip is unpacked. Tar and gzip archives are returned as downloaded;
/// the published Lincoln Beet release is a single zip.
///
/// Entries are extracted into a hidden sibling directory which is renamed to
/// [`unpacked_dir`] once every entry is written, so a failed extraction
/// leaves no unpacked directory behind. Entries whose names would escape the
/// target directory are rejected by the zip reader.
pub fn unpack_if_archive<P: AsRef<Path>>(path: P) -> Result<PathBuf, Error> {
    let path = path.as_ref();
    if !path.is_file() || !is_zip(path) {
        debug!("{} is not a zip archive, nothing to unpack", path.display());
        return Ok(path.to_path_buf());
    }

    let target = unpacked_dir(path);
    info!(
        "Unpacking archive '{}' to '{}'...",
        path.display(),
        target.display()
    );

    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let partial = tempfile::Builder::new()
        .prefix(".unpacking-")
        .tempdir_in(parent)?;
    archive.extract(partial.path())?;

    if target.exists() {
        warn!("Replacing stale directory '{}'", target.display());
        std::fs::remove_dir_all(&target)?;
    }
    std::fs::rename(partial.keep(), &target)?;

    debug!("Unpacked {} entries", archive.len());
    Ok(target)
}

/// Counts regular files below `path` whose name ends with `extension`.
pub fn count_files<P: AsRef<Path>>(path: P, extension: &str) -> usize {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(extension))
        .count()
}
