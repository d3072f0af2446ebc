// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Unique identifier for a team on the platform.
///
/// Teams own the file storage ("team files") that archives are staged in.
///
/// # Examples
///
/// ```rust
/// use lincoln_beet::TeamID;
/// use std::str::FromStr;
///
/// let team_id = TeamID::from_str("42").unwrap();
/// assert_eq!(team_id.value(), 42);
/// ```
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TeamID(u64);

impl Display for TeamID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TeamID {
    fn from(id: u64) -> Self {
        TeamID(id)
    }
}

impl From<TeamID> for u64 {
    fn from(val: TeamID) -> Self {
        val.0
    }
}

impl TeamID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for TeamID {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TeamID(s.trim().parse()?))
    }
}

/// Unique identifier for a workspace, the container projects are created in.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkspaceID(u64);

impl Display for WorkspaceID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for WorkspaceID {
    fn from(id: u64) -> Self {
        WorkspaceID(id)
    }
}

impl From<WorkspaceID> for u64 {
    fn from(val: WorkspaceID) -> Self {
        val.0
    }
}

impl WorkspaceID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for WorkspaceID {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(WorkspaceID(s.trim().parse()?))
    }
}

/// Unique identifier for a project within a workspace.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectID(u64);

impl Display for ProjectID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProjectID {
    fn from(id: u64) -> Self {
        ProjectID(id)
    }
}

impl From<ProjectID> for u64 {
    fn from(val: ProjectID) -> Self {
        val.0
    }
}

impl ProjectID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Unique identifier for a dataset within a project.
///
/// Each split of the Lincoln Beet data (train, val, test) becomes one dataset.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetID(u64);

impl Display for DatasetID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DatasetID {
    fn from(id: u64) -> Self {
        DatasetID(id)
    }
}

impl From<DatasetID> for u64 {
    fn from(val: DatasetID) -> Self {
        val.0
    }
}

impl DatasetID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Unique identifier the platform assigns to an uploaded image.
///
/// Annotations are attached to images by this id, never by filename.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageID(u64);

impl Display for ImageID {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ImageID {
    fn from(id: u64) -> Self {
        ImageID(id)
    }
}

impl From<ImageID> for u64 {
    fn from(val: ImageID) -> Self {
        val.0
    }
}

impl ImageID {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Project handle returned by project creation.
///
/// The name may differ from the requested one when the platform renamed the
/// project to avoid a conflict.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    id: ProjectID,
    name: String,
    workspace_id: WorkspaceID,
}

impl Display for ProjectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

impl ProjectInfo {
    pub fn new(id: ProjectID, name: &str, workspace_id: WorkspaceID) -> Self {
        ProjectInfo {
            id,
            name: name.to_owned(),
            workspace_id,
        }
    }

    pub fn id(&self) -> ProjectID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace_id(&self) -> WorkspaceID {
        self.workspace_id
    }
}

/// Dataset handle returned by dataset creation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    id: DatasetID,
    name: String,
    project_id: ProjectID,
}

impl Display for DatasetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

impl DatasetInfo {
    pub fn new(id: DatasetID, name: &str, project_id: ProjectID) -> Self {
        DatasetInfo {
            id,
            name: name.to_owned(),
            project_id,
        }
    }

    pub fn id(&self) -> DatasetID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_id(&self) -> ProjectID {
        self.project_id
    }
}

/// Image handle returned by image upload, one per uploaded file in request
/// order.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    id: ImageID,
    name: String,
    #[serde(default)]
    hash: Option<String>,
}

impl ImageInfo {
    pub fn new(id: ImageID, name: &str) -> Self {
        ImageInfo {
            id,
            name: name.to_owned(),
            hash: None,
        }
    }

    pub fn id(&self) -> ImageID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }
}
