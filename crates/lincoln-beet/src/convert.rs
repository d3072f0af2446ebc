// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Conversion of the unpacked dataset into platform uploads.
//!
//! The project and its schema are created first. Then each split (train,
//! val, test) gets its own dataset and is uploaded in batches of
//! [`Settings::batch_size`] images, each batch followed by one annotation
//! call covering the images just uploaded. Splits and batches run strictly
//! one after the other. Nothing is rolled back: an error aborts the run and
//! leaves what was already uploaded in place.

use crate::{
    Error, Progress,
    api::{DatasetInfo, ProjectInfo, WorkspaceID},
    coco::{AnnotationRecord, ImageRecord, Split, SplitIndex},
    dataset::{Annotation, Label, ProjectMeta, Rectangle},
    settings::Settings,
    tags::{ImageTags, TagTable},
    uploader::Uploader,
};
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Sender;

/// Counts for one uploaded split.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitSummary {
    pub split: Split,
    pub dataset: DatasetInfo,
    pub images: usize,
    pub annotations: usize,
    pub batches: usize,
}

/// Result of a conversion run: the created project and per-split counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportSummary {
    pub project: ProjectInfo,
    pub splits: Vec<SplitSummary>,
}

impl ImportSummary {
    pub fn images(&self) -> usize {
        self.splits.iter().map(|s| s.images).sum()
    }

    pub fn annotations(&self) -> usize {
        self.splits.iter().map(|s| s.annotations).sum()
    }
}

/// Builds the annotation of one image: its size, one rectangle per source
/// box and its four characteristics tags.
pub fn create_annotation(
    meta: &ProjectMeta,
    image: &ImageRecord,
    boxes: &[AnnotationRecord],
    tags: &ImageTags,
) -> Result<Annotation, Error> {
    let labels = boxes
        .iter()
        .map(|record| {
            let class = meta.class_for_category(record.category_id)?;
            Ok(Label::new(class, Rectangle::from_coco_bbox(record.bbox)))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Annotation::new(
        image.height,
        image.width,
        labels,
        tags.to_tags(meta)?,
    ))
}

/// Uploads the dataset found below `dataset_root` into a new project named
/// `project_name` in the workspace.
///
/// Progress counts images uploaded within the current split.
pub async fn convert_and_upload<U: Uploader>(
    uploader: &U,
    settings: &Settings,
    dataset_root: &Path,
    workspace_id: WorkspaceID,
    project_name: &str,
    progress: Option<Sender<Progress>>,
) -> Result<ImportSummary, Error> {
    if settings.batch_size == 0 {
        return Err(Error::InvalidSettings(
            "batch_size must be greater than zero".to_owned(),
        ));
    }

    let meta = ProjectMeta::lincoln_beet();
    let project = uploader.create_project(workspace_id, project_name).await?;
    uploader.update_project_meta(project.id(), &meta).await?;
    info!("Created project {} in workspace {}", project, workspace_id);

    let layout = &settings.layout;
    let tags = TagTable::read(layout.characteristics_path(dataset_root))?;
    let images_dir = layout.images_dir(dataset_root);

    let mut splits = Vec::with_capacity(Split::ALL.len());
    for split in Split::ALL {
        let index = SplitIndex::read(split, layout.split_path(dataset_root, split))?;
        let summary = upload_split(
            uploader,
            &project,
            &meta,
            &index,
            &tags,
            &images_dir,
            settings.batch_size,
            progress.as_ref(),
        )
        .await?;
        info!(
            "Uploaded {}: {} images, {} boxes in {} batches",
            summary.dataset, summary.images, summary.annotations, summary.batches
        );
        splits.push(summary);
    }

    Ok(ImportSummary { project, splits })
}

#[allow(clippy::too_many_arguments)]
async fn upload_split<U: Uploader>(
    uploader: &U,
    project: &ProjectInfo,
    meta: &ProjectMeta,
    index: &SplitIndex,
    tags: &TagTable,
    images_dir: &Path,
    batch_size: usize,
    progress: Option<&Sender<Progress>>,
) -> Result<SplitSummary, Error> {
    let dataset = uploader
        .create_dataset(project.id(), index.split().name())
        .await?;

    let total = index.images().len();
    let mut summary = SplitSummary {
        split: index.split(),
        dataset: dataset.clone(),
        images: 0,
        annotations: 0,
        batches: 0,
    };

    for batch in index.images().chunks(batch_size) {
        // Resolved up front so a missing tag row aborts before the transfer.
        let annotations = batch
            .iter()
            .map(|image| {
                create_annotation(
                    meta,
                    image,
                    index.annotations(&image.file_name),
                    tags.get(&image.file_name)?,
                )
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let names: Vec<String> = batch.iter().map(|i| i.file_name.clone()).collect();
        let paths: Vec<PathBuf> = names.iter().map(|name| images_dir.join(name)).collect();

        let uploaded = uploader.upload_images(dataset.id(), &names, &paths).await?;
        if uploaded.len() != batch.len() {
            return Err(Error::InvalidResponse);
        }
        let image_ids: Vec<_> = uploaded.iter().map(|info| info.id()).collect();
        uploader
            .upload_annotations(&image_ids, &annotations)
            .await?;

        summary.batches += 1;
        summary.images += batch.len();
        summary.annotations += annotations.iter().map(|a| a.labels().len()).sum::<usize>();
        debug!(
            "{}: batch {} done ({}/{})",
            index.split(),
            summary.batches,
            summary.images,
            total
        );

        if let Some(progress) = progress {
            let _ = progress
                .send(Progress {
                    current: summary.images,
                    total,
                })
                .await;
        }
    }

    Ok(summary)
}
