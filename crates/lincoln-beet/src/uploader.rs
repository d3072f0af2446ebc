// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! The narrow platform interface the conversion pipeline talks to.
//!
//! [`crate::Client`] implements [`Uploader`] against the platform web API.
//! [`MemoryUploader`] keeps everything in memory; it backs the CLI dry-run
//! mode and the pipeline tests.

use crate::{
    Error,
    api::{DatasetID, DatasetInfo, ImageID, ImageInfo, ProjectID, ProjectInfo, WorkspaceID},
    dataset::{Annotation, ProjectMeta},
};
use log::debug;
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// Remote platform operations used by the conversion.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    /// Creates a project, renaming it when the name is already taken.
    async fn create_project(
        &self,
        workspace_id: WorkspaceID,
        name: &str,
    ) -> Result<ProjectInfo, Error>;

    /// Replaces the schema of a project.
    async fn update_project_meta(
        &self,
        project_id: ProjectID,
        meta: &ProjectMeta,
    ) -> Result<(), Error>;

    /// Creates a dataset inside a project, renaming it when the name is
    /// already taken.
    async fn create_dataset(&self, project_id: ProjectID, name: &str)
    -> Result<DatasetInfo, Error>;

    /// Uploads image files under the given names. The result holds one entry
    /// per image in request order.
    async fn upload_images(
        &self,
        dataset_id: DatasetID,
        names: &[String],
        paths: &[PathBuf],
    ) -> Result<Vec<ImageInfo>, Error>;

    /// Attaches one annotation to each image; both slices are in the same
    /// order.
    async fn upload_annotations(
        &self,
        image_ids: &[ImageID],
        annotations: &[Annotation],
    ) -> Result<(), Error>;
}

/// Returns `name` if unused, otherwise the first free `name_001`,
/// `name_002`, ...
pub fn free_name<'a, I>(name: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let is_taken = |candidate: &str| taken.clone().into_iter().any(|t| t == candidate);
    if !is_taken(name) {
        return name.to_owned();
    }
    (1..)
        .map(|n| format!("{}_{:03}", name, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_owned())
}

/// A remote call as recorded by [`MemoryUploader`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateProject(String),
    UpdateProjectMeta(ProjectID),
    CreateDataset(String),
    UploadImages(DatasetID, usize),
    UploadAnnotations(usize),
}

/// An image stored by [`MemoryUploader`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredImage {
    pub dataset_id: DatasetID,
    pub info: ImageInfo,
    pub path: PathBuf,
    pub annotation: Option<Annotation>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    calls: Vec<Call>,
    projects: Vec<ProjectInfo>,
    metas: Vec<(ProjectID, ProjectMeta)>,
    datasets: Vec<DatasetInfo>,
    images: Vec<StoredImage>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`Uploader`].
///
/// Image files are checked for existence but never read. Ids are assigned
/// from a single counter shared by all entities.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    state: Mutex<State>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a panicking test thread; the data is
        // still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All calls in the order they were made.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn projects(&self) -> Vec<ProjectInfo> {
        self.state().projects.clone()
    }

    /// The latest schema pushed to a project.
    pub fn project_meta(&self, project_id: ProjectID) -> Option<ProjectMeta> {
        self.state()
            .metas
            .iter()
            .rev()
            .find(|(id, _)| *id == project_id)
            .map(|(_, meta)| meta.clone())
    }

    pub fn datasets(&self) -> Vec<DatasetInfo> {
        self.state().datasets.clone()
    }

    /// Images of a dataset in upload order.
    pub fn images(&self, dataset_id: DatasetID) -> Vec<StoredImage> {
        self.state()
            .images
            .iter()
            .filter(|image| image.dataset_id == dataset_id)
            .cloned()
            .collect()
    }
}

impl Uploader for MemoryUploader {
    async fn create_project(
        &self,
        workspace_id: WorkspaceID,
        name: &str,
    ) -> Result<ProjectInfo, Error> {
        let mut state = self.state();
        let name = free_name(
            name,
            state
                .projects
                .iter()
                .filter(|p| p.workspace_id() == workspace_id)
                .map(|p| p.name()),
        );
        let project = ProjectInfo::new(state.next_id().into(), &name, workspace_id);
        debug!("Created project {}", project);
        state.calls.push(Call::CreateProject(name));
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project_meta(
        &self,
        project_id: ProjectID,
        meta: &ProjectMeta,
    ) -> Result<(), Error> {
        let mut state = self.state();
        if !state.projects.iter().any(|p| p.id() == project_id) {
            return Err(Error::InvalidParameters(format!(
                "unknown project {}",
                project_id
            )));
        }
        state.calls.push(Call::UpdateProjectMeta(project_id));
        state.metas.push((project_id, meta.clone()));
        Ok(())
    }

    async fn create_dataset(
        &self,
        project_id: ProjectID,
        name: &str,
    ) -> Result<DatasetInfo, Error> {
        let mut state = self.state();
        if !state.projects.iter().any(|p| p.id() == project_id) {
            return Err(Error::InvalidParameters(format!(
                "unknown project {}",
                project_id
            )));
        }
        let name = free_name(
            name,
            state
                .datasets
                .iter()
                .filter(|d| d.project_id() == project_id)
                .map(|d| d.name()),
        );
        let dataset = DatasetInfo::new(state.next_id().into(), &name, project_id);
        debug!("Created dataset {}", dataset);
        state.calls.push(Call::CreateDataset(name));
        state.datasets.push(dataset.clone());
        Ok(dataset)
    }

    async fn upload_images(
        &self,
        dataset_id: DatasetID,
        names: &[String],
        paths: &[PathBuf],
    ) -> Result<Vec<ImageInfo>, Error> {
        if names.len() != paths.len() {
            return Err(Error::InvalidParameters(format!(
                "{} names for {} image files",
                names.len(),
                paths.len()
            )));
        }
        for path in paths {
            check_file(path)?;
        }

        let mut state = self.state();
        if !state.datasets.iter().any(|d| d.id() == dataset_id) {
            return Err(Error::InvalidParameters(format!(
                "unknown dataset {}",
                dataset_id
            )));
        }

        let mut uploaded = Vec::with_capacity(names.len());
        for (name, path) in names.iter().zip(paths) {
            let info = ImageInfo::new(state.next_id().into(), name);
            state.images.push(StoredImage {
                dataset_id,
                info: info.clone(),
                path: path.clone(),
                annotation: None,
            });
            uploaded.push(info);
        }
        state.calls.push(Call::UploadImages(dataset_id, uploaded.len()));
        Ok(uploaded)
    }

    async fn upload_annotations(
        &self,
        image_ids: &[ImageID],
        annotations: &[Annotation],
    ) -> Result<(), Error> {
        if image_ids.len() != annotations.len() {
            return Err(Error::InvalidParameters(format!(
                "{} annotations for {} images",
                annotations.len(),
                image_ids.len()
            )));
        }

        let mut state = self.state();
        for (id, annotation) in image_ids.iter().zip(annotations) {
            let image = state
                .images
                .iter_mut()
                .find(|image| image.info.id() == *id)
                .ok_or_else(|| Error::InvalidParameters(format!("unknown image {}", id)))?;
            image.annotation = Some(annotation.clone());
        }
        state.calls.push(Call::UploadAnnotations(annotations.len()));
        Ok(())
    }
}

fn check_file(path: &Path) -> Result<(), Error> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() {
        Ok(())
    } else {
        Err(Error::InvalidParameters(format!(
            "{} is not a file",
            path.display()
        )))
    }
}
