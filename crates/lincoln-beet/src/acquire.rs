// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Acquisition of the original dataset archives.
//!
//! Archives are staged in a remote directory (team files on the platform, or
//! a local directory for offline runs) and fetched through a [`FileStore`].
//! Each archive is downloaded into the local buffer directory and unpacked
//! next to itself. Archives whose unpacked directory already exists are
//! skipped, so running the acquisition twice downloads nothing the second
//! time.

use crate::{
    Error, Progress,
    archive::{unpack_if_archive, unpacked_dir},
    settings::DownloadSource,
};
use log::{debug, info};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    sync::mpsc::{self, Sender},
};
use url::Url;
use walkdir::WalkDir;

const COPY_CHUNK: usize = 1024 * 1024;

/// Remote file storage the archives are staged in.
#[allow(async_fn_in_trait)]
pub trait FileStore {
    /// Total size in bytes of the files below `remote_dir`.
    async fn directory_size(&self, remote_dir: &str) -> Result<u64, Error>;

    /// Downloads `remote_path` to `local_path`, reporting transferred bytes.
    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<Sender<Progress>>,
    ) -> Result<(), Error>;
}

/// A local directory standing in for remote storage.
///
/// Remote paths are resolved relative to `root`; a leading `/` is ignored.
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        LocalFileStore { root: root.into() }
    }

    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }
}

impl FileStore for LocalFileStore {
    async fn directory_size(&self, remote_dir: &str) -> Result<u64, Error> {
        let dir = self.resolve(remote_dir);
        let mut total = 0;
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| Error::IoError(e.into()))?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(|e| Error::IoError(e.into()))?.len();
            }
        }
        Ok(total)
    }

    async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<Sender<Progress>>,
    ) -> Result<(), Error> {
        let source = self.resolve(remote_path);
        let mut input = File::open(&source).await?;
        let total = input.metadata().await?.len() as usize;

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut output = File::create(local_path).await?;

        let mut buffer = vec![0u8; COPY_CHUNK];
        let mut current = 0;
        loop {
            let n = input.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            output.write_all(&buffer[..n]).await?;
            current += n;
            if let Some(progress) = &progress {
                let _ = progress.send(Progress { current, total }).await;
            }
        }
        output.flush().await?;

        Ok(())
    }
}

/// Archive filename named by a download URL: its last path segment,
/// percent-decoded.
///
/// ```rust
/// use lincoln_beet::archive_name_from_url;
///
/// let name = archive_name_from_url("https://host/s/abc/Lincoln%20Beet.zip?dl=0").unwrap();
/// assert_eq!(name, "Lincoln Beet.zip");
/// ```
pub fn archive_name_from_url(url: &str) -> Result<String, Error> {
    let parsed = Url::parse(url)?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidSource(format!("'{}' does not name a file", url)))?;

    let name = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|e| Error::InvalidSource(format!("'{}': {}", url, e)))?;
    Ok(name.into_owned())
}

fn remote_path(staging_dir: &str, file_name: &str) -> String {
    format!("{}/{}", staging_dir.trim_end_matches('/'), file_name)
}

/// Downloads and unpacks the archives named by `source` into `buffer_dir`
/// and returns `buffer_dir` as the dataset root.
///
/// Progress is reported in bytes downloaded so far against the size of
/// `staging_dir`.
pub async fn download_dataset<S: FileStore>(
    store: &S,
    source: &DownloadSource,
    staging_dir: &str,
    buffer_dir: &Path,
    progress: Option<Sender<Progress>>,
) -> Result<PathBuf, Error> {
    fs::create_dir_all(buffer_dir).await?;

    let archives = match source {
        DownloadSource::Url(url) => vec![archive_name_from_url(url)?],
        DownloadSource::Archives(map) => {
            if map.is_empty() {
                return Err(Error::InvalidSource("no archives listed".to_owned()));
            }
            map.keys().cloned().collect()
        }
    };

    let mut staged: Option<usize> = None;
    let mut done = 0;
    for file_name in archives {
        let local_path = buffer_dir.join(&file_name);
        let target = unpacked_dir(&local_path);

        if target != local_path && target.exists() {
            info!(
                "Archive '{}' was already unpacked to '{}'. Skipping...",
                file_name,
                target.display()
            );
            continue;
        }

        let total = match staged {
            Some(total) => total,
            None => {
                let total = store.directory_size(staging_dir).await? as usize;
                staged = Some(total);
                total
            }
        };
        info!("Downloading '{}' to buffer...", file_name);

        let remote = remote_path(staging_dir, &file_name);
        let (tx, mut rx) = mpsc::channel::<Progress>(16);
        let forward = async {
            while let Some(file_progress) = rx.recv().await {
                if let Some(progress) = &progress {
                    let current = done + file_progress.current;
                    let _ = progress
                        .send(Progress {
                            current,
                            total: total.max(current),
                        })
                        .await;
                }
            }
        };
        let (result, ()) = tokio::join!(store.download(&remote, &local_path, Some(tx)), forward);
        result?;
        done += fs::metadata(&local_path).await?.len() as usize;

        info!("Start unpacking archive '{}'...", file_name);
        let unpacked = unpack_if_archive(&local_path)?;
        debug!("Unpacked '{}' to {}", file_name, unpacked.display());
    }

    Ok(buffer_dir.to_path_buf())
}
