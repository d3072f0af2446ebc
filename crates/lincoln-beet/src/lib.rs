// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! # Lincoln Beet Converter
//!
//! Converts the Lincoln Beet agricultural object detection dataset from its
//! original release (COCO-style split files, an image characteristics CSV
//! and a directory of images) into a project on a dataset management
//! platform.
//!
//! The pipeline has two stages:
//!
//! - **Acquisition**: [`download_dataset`] fetches the original archives
//!   from a [`FileStore`] into a local buffer directory and unpacks them.
//!   Archives already unpacked are skipped.
//! - **Conversion**: [`convert_and_upload`] creates the project and its
//!   schema, then uploads each split (train, val, test) as its own dataset
//!   in batches of images with their annotations, through an [`Uploader`].
//!
//! [`Client`] implements both traits against the platform web API.
//! [`LocalFileStore`] and [`MemoryUploader`] stand in for the platform in
//! offline runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lincoln_beet::{Client, Error, Settings, convert_and_upload, download_dataset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let settings = Settings::load(None)?;
//!     let client = Client::new("https://app.example.com")?
//!         .with_token("secret")?
//!         .with_team(7.into());
//!
//!     let source = settings
//!         .download_original_url
//!         .clone()
//!         .ok_or_else(|| Error::InvalidSettings("no download source".to_owned()))?;
//!     let root = download_dataset(
//!         &client,
//!         &source,
//!         &settings.staging_dir,
//!         std::path::Path::new("/tmp/lincoln-beet"),
//!         None,
//!     )
//!     .await?;
//!
//!     let summary =
//!         convert_and_upload(&client, &settings, &root, 12.into(), &settings.project_name, None)
//!             .await?;
//!     println!("Uploaded {} images", summary.images());
//!     Ok(())
//! }
//! ```

mod acquire;
mod api;
mod archive;
mod client;
mod coco;
mod convert;
mod dataset;
mod error;
mod retry;
mod settings;
mod tags;
mod uploader;

pub use crate::{
    acquire::{FileStore, LocalFileStore, archive_name_from_url, download_dataset},
    api::{
        DatasetID, DatasetInfo, ImageID, ImageInfo, ProjectID, ProjectInfo, TeamID, WorkspaceID,
    },
    archive::{count_files, unpack_if_archive, unpacked_dir},
    client::{Client, Progress, image_hash},
    coco::{AnnotationRecord, ImageRecord, Split, SplitIndex},
    convert::{ImportSummary, SplitSummary, convert_and_upload, create_annotation},
    dataset::{
        Annotation, GeometryType, Label, ObjClass, ProjectMeta, Rectangle, SUGAR_BEET,
        TAG_AVERAGE_OCCLUSION, TAG_AVERAGE_RELATIVE_SIZE, TAG_BBOXES_OCCUPATION,
        TAG_ITEM_DENSITY, Tag, TagMeta, TagValue, TagValueType, WEED,
    },
    error::Error,
    retry::{RetryScope, classify_url},
    settings::{
        BATCH_SIZE, Catalog, DatasetLayout, DownloadSource, Links, Settings, default_buffer_dir,
    },
    tags::{ImageTags, TagTable},
    uploader::{Call, MemoryUploader, StoredImage, Uploader, free_name},
};
