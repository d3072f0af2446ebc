// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Dataset settings.
//!
//! [`Settings`] holds the catalog metadata of the Lincoln Beet dataset, where
//! to fetch the original archives from and how the unpacked files are laid
//! out. The compiled-in defaults describe the published dataset; a TOML file
//! and `LINCOLN_BEET_*` environment variables may override any field.
//!
//! ```bash
//! export LINCOLN_BEET_PROJECT_NAME="Lincoln Beet (staging)"
//! export LINCOLN_BEET_LAYOUT__IMAGES=images
//! ```
//!
//! Settings are loaded once at startup and passed by reference afterwards.

use crate::{Error, coco::Split};
use chrono::{Datelike as _, NaiveDate};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Number of images uploaded per round-trip.
pub const BATCH_SIZE: usize = 300;

/// Where the original archives come from.
///
/// A single URL names one archive; the archive filename is the last path
/// segment of the URL. A mapping lists several archives by filename.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DownloadSource {
    Url(String),
    Archives(BTreeMap<String, String>),
}

/// A link field of the catalog: one URL, a list, or named URLs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Links {
    One(String),
    Many(Vec<String>),
    Named(BTreeMap<String, String>),
}

/// File layout of the unpacked dataset, relative to the dataset root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    /// Directory holding everything below.
    pub root: String,
    /// Image directory, relative to `root`.
    pub images: String,
    /// Image characteristics CSV, relative to `root`.
    pub characteristics: String,
    pub train: String,
    pub val: String,
    pub test: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        DatasetLayout {
            root: "all_fields_lincolnbeet".to_owned(),
            images: "all".to_owned(),
            characteristics: "image_characteristics.csv".to_owned(),
            train: "json_train_set.json".to_owned(),
            val: "json_val_set.json".to_owned(),
            test: "json_test_set.json".to_owned(),
        }
    }
}

impl DatasetLayout {
    pub fn images_dir(&self, dataset_root: &Path) -> PathBuf {
        dataset_root.join(&self.root).join(&self.images)
    }

    pub fn characteristics_path(&self, dataset_root: &Path) -> PathBuf {
        dataset_root.join(&self.root).join(&self.characteristics)
    }

    pub fn split_path(&self, dataset_root: &Path, split: Split) -> PathBuf {
        let file = match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        };
        dataset_root.join(&self.root).join(file)
    }
}

/// Immutable dataset settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub project_name: String,
    pub project_name_full: Option<String>,
    pub hide_dataset: bool,

    pub license: Option<String>,
    pub applications: Vec<String>,
    pub category: Option<String>,
    pub cv_tasks: Vec<String>,
    pub annotation_types: Vec<String>,
    /// `YYYY-MM-DD`.
    pub release_date: Option<String>,
    pub homepage_url: Option<String>,
    pub preview_image_id: Option<u64>,
    pub github_url: Option<String>,

    pub download_original_url: Option<DownloadSource>,
    pub class2color: Option<BTreeMap<String, [u8; 3]>>,
    pub paper: Option<Links>,
    pub blogpost: Option<Links>,
    pub repository: Option<Links>,
    pub citation_url: Option<String>,
    pub authors: Vec<String>,
    pub authors_contacts: Vec<String>,
    pub organization_name: Option<Links>,
    pub organization_url: Option<Links>,
    pub slytagsplit: Option<BTreeMap<String, serde_json::Value>>,
    pub tags: Vec<String>,
    pub explore_datasets: Vec<String>,

    /// Remote directory in team files the archives are staged in.
    pub staging_dir: String,
    pub layout: DatasetLayout,
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            project_name: "Lincoln Beet".to_owned(),
            project_name_full: Some("Lincoln Beet".to_owned()),
            hide_dataset: true,
            license: Some("unknown".to_owned()),
            applications: vec!["industry:agricultural".to_owned()],
            category: Some("agriculture".to_owned()),
            cv_tasks: vec!["object detection".to_owned()],
            annotation_types: vec!["object detection".to_owned()],
            release_date: Some("2021-09-28".to_owned()),
            homepage_url: Some("https://github.com/LAR/lincolnbeet_dataset".to_owned()),
            preview_image_id: Some(8070102),
            github_url: Some("https://github.com/dataset-ninja/lincoln-beet".to_owned()),
            download_original_url: Some(DownloadSource::Url(
                "https://www.dropbox.com/s/0rq7cc8t6rja632/all_fields_lincolnbeet.zip?dl=0"
                    .to_owned(),
            )),
            class2color: None,
            paper: Some(Links::Many(vec![
                "https://arxiv.org/abs/2109.11048".to_owned(),
            ])),
            blogpost: None,
            repository: Some(Links::Named(BTreeMap::from([(
                "Kaggle".to_owned(),
                "https://www.kaggle.com/datasets/amiranmkrtchyan/amirans".to_owned(),
            )]))),
            citation_url: Some("https://arxiv.org/abs/2109.11048".to_owned()),
            authors: vec![
                "Adrian Salazar-Gomez".to_owned(),
                "Madeleine Darbyshire".to_owned(),
                "Junfeng Gao".to_owned(),
                "Elizabeth I Sklar".to_owned(),
                "Simon Parsons".to_owned(),
            ],
            authors_contacts: vec!["asalazargomez@lincoln.ac.uk".to_owned()],
            organization_name: Some(Links::Many(vec!["University of Lincoln, UK".to_owned()])),
            organization_url: Some(Links::Many(vec!["https://www.lincoln.ac.uk/".to_owned()])),
            slytagsplit: Some(BTreeMap::from([(
                "__POSTTEXT__".to_owned(),
                serde_json::Value::String(
                    "Also, the dataset contains ***item_density***, ***bbox_occupation***, \
                     ***average_relative_size*** and ***averege_level_occlusion*** image tags"
                        .to_owned(),
                ),
            )])),
            tags: Vec::new(),
            explore_datasets: Vec::new(),
            staging_dir: "/lincoln-beet/".to_owned(),
            layout: DatasetLayout::default(),
            batch_size: BATCH_SIZE,
        }
    }
}

/// Full catalog record consumed by the documentation generator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Catalog {
    pub project_name: String,
    pub project_name_full: String,
    pub hide_dataset: bool,
    pub license: String,
    pub applications: Vec<String>,
    pub category: String,
    pub cv_tasks: Vec<String>,
    pub annotation_types: Vec<String>,
    pub release_year: i32,
    pub homepage_url: String,
    pub preview_image_id: u64,
    pub github_url: String,

    pub release_date: Option<String>,
    pub download_original_url: Option<DownloadSource>,
    pub class2color: Option<BTreeMap<String, [u8; 3]>>,
    pub paper: Option<Links>,
    pub blog: Option<Links>,
    pub repository: Option<Links>,
    pub citation_url: Option<String>,
    pub authors: Vec<String>,
    pub authors_contacts: Vec<String>,
    pub organization_name: Option<Links>,
    pub organization_url: Option<Links>,
    pub slytagsplit: Option<BTreeMap<String, serde_json::Value>>,
    pub tags: Vec<String>,
    pub explore_datasets: Vec<String>,
}

impl Settings {
    /// Loads settings: compiled-in defaults, then the optional TOML file,
    /// then `LINCOLN_BEET_*` environment variables (`__` separates nested
    /// keys).
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            debug!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("LINCOLN_BEET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if settings.batch_size == 0 {
            return Err(Error::InvalidSettings(
                "batch_size must be greater than zero".to_owned(),
            ));
        }

        Ok(settings)
    }

    /// Validates the fields needed before anything is uploaded.
    pub fn check_names(&self) -> Result<(), Error> {
        if self.project_name.trim().is_empty() {
            return Err(Error::InvalidSettings(
                "project_name must be set before uploading".to_owned(),
            ));
        }
        Ok(())
    }

    /// Year of the release date, if one is set.
    pub fn release_year(&self) -> Result<Option<i32>, Error> {
        self.release_date
            .as_deref()
            .map(|date| {
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map(|d| d.year())
                    .map_err(|e| {
                        Error::InvalidSettings(format!("release_date '{}': {}", date, e))
                    })
            })
            .transpose()
    }

    /// Builds the catalog record, failing if a required field is unset.
    pub fn catalog(&self) -> Result<Catalog, Error> {
        self.check_names()?;

        let mut missing = Vec::new();
        let release_year = self.release_year()?;
        if self.license.is_none() {
            missing.push("license");
        }
        if self.applications.is_empty() {
            missing.push("applications");
        }
        if self.category.is_none() {
            missing.push("category");
        }
        if self.cv_tasks.is_empty() {
            missing.push("cv_tasks");
        }
        if self.annotation_types.is_empty() {
            missing.push("annotation_types");
        }
        if release_year.is_none() {
            missing.push("release_year");
        }
        if self.homepage_url.is_none() {
            missing.push("homepage_url");
        }
        if self.preview_image_id.is_none() {
            missing.push("preview_image_id");
        }
        if self.github_url.is_none() {
            missing.push("github_url");
        }

        match (
            &self.license,
            &self.category,
            release_year,
            &self.homepage_url,
            self.preview_image_id,
            &self.github_url,
        ) {
            (
                Some(license),
                Some(category),
                Some(release_year),
                Some(homepage_url),
                Some(preview_image_id),
                Some(github_url),
            ) if missing.is_empty() => Ok(Catalog {
                project_name: self.project_name.clone(),
                project_name_full: self
                    .project_name_full
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| self.project_name.clone()),
                hide_dataset: self.hide_dataset,
                license: license.clone(),
                applications: self.applications.clone(),
                category: category.clone(),
                cv_tasks: self.cv_tasks.clone(),
                annotation_types: self.annotation_types.clone(),
                release_year,
                homepage_url: homepage_url.clone(),
                preview_image_id,
                github_url: github_url.clone(),
                release_date: self.release_date.clone(),
                download_original_url: self.download_original_url.clone(),
                class2color: self.class2color.clone(),
                paper: self.paper.clone(),
                blog: self.blogpost.clone(),
                repository: self.repository.clone(),
                citation_url: self.citation_url.clone(),
                authors: self.authors.clone(),
                authors_contacts: self.authors_contacts.clone(),
                organization_name: self.organization_name.clone(),
                organization_url: self.organization_url.clone(),
                slytagsplit: self.slytagsplit.clone(),
                tags: self.tags.clone(),
                explore_datasets: self.explore_datasets.clone(),
            }),
            _ => Err(Error::InvalidSettings(format!(
                "fill all catalog fields after uploading, missing: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Default local buffer directory archives are downloaded to and unpacked
/// in.
pub fn default_buffer_dir() -> Result<PathBuf, Error> {
    let dirs = ProjectDirs::from("org", "dataset-ninja", "lincoln-beet").ok_or_else(|| {
        Error::InvalidSettings("could not determine the user data directory".to_owned())
    })?;
    Ok(dirs.data_dir().join("buffer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_defaults_describe_lincoln_beet() {
        let settings = Settings::default();
        assert_eq!(settings.project_name, "Lincoln Beet");
        assert_eq!(settings.batch_size, 300);
        assert_eq!(settings.release_year().unwrap(), Some(2021));
        assert!(matches!(
            settings.download_original_url,
            Some(DownloadSource::Url(_))
        ));
    }

    #[test]
    fn test_layout_paths() {
        let layout = DatasetLayout::default();
        let root = Path::new("/buffer");
        assert_eq!(
            layout.images_dir(root),
            PathBuf::from("/buffer/all_fields_lincolnbeet/all")
        );
        assert_eq!(
            layout.split_path(root, Split::Val),
            PathBuf::from("/buffer/all_fields_lincolnbeet/json_val_set.json")
        );
        assert_eq!(
            layout.characteristics_path(root),
            PathBuf::from("/buffer/all_fields_lincolnbeet/image_characteristics.csv")
        );
    }

    #[test]
    fn test_catalog_from_defaults() {
        let catalog = Settings::default().catalog().unwrap();
        assert_eq!(catalog.release_year, 2021);
        assert_eq!(catalog.project_name_full, "Lincoln Beet");
        assert_eq!(catalog.preview_image_id, 8070102);
        assert_eq!(catalog.authors.len(), 5);

        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(
            json["repository"]["Kaggle"],
            "https://www.kaggle.com/datasets/amiranmkrtchyan/amirans"
        );
    }

    #[test]
    fn test_catalog_reports_missing_fields() {
        let settings = Settings {
            homepage_url: None,
            release_date: None,
            ..Settings::default()
        };
        match settings.catalog() {
            Err(Error::InvalidSettings(msg)) => {
                assert!(msg.contains("homepage_url"));
                assert!(msg.contains("release_year"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_names_rejects_empty_project_name() {
        let settings = Settings {
            project_name: "  ".to_owned(),
            ..Settings::default()
        };
        assert!(settings.check_names().is_err());
        assert!(settings.catalog().is_err());
    }

    #[test]
    fn test_bad_release_date() {
        let settings = Settings {
            release_date: Some("28/09/2021".to_owned()),
            ..Settings::default()
        };
        assert!(matches!(
            settings.release_year(),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "project_name = \"Lincoln Beet Test\"").unwrap();
        writeln!(file, "batch_size = 2").unwrap();
        writeln!(file, "[layout]").unwrap();
        writeln!(file, "images = \"images\"").unwrap();
        drop(file);

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.project_name, "Lincoln Beet Test");
        assert_eq!(settings.batch_size, 2);
        assert_eq!(settings.layout.images, "images");
        assert_eq!(settings.layout.root, "all_fields_lincolnbeet");
        assert_eq!(settings.authors.len(), 5);
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "batch_size = 0\n").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(Error::InvalidSettings(_))
        ));
    }
}
