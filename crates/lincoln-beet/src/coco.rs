// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! COCO-style split annotation files.
//!
//! Each split (train, val, test) ships as one JSON file with an `images` list
//! and an `annotations` list cross-referenced by numeric image id. Only the
//! fields the conversion needs are read; everything else is ignored.

use crate::Error;
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Dataset split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// All splits in upload order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An image entry of a split file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ImageRecord {
    pub id: u64,
    pub file_name: String,
    #[serde(deserialize_with = "pixels")]
    pub height: u32,
    #[serde(deserialize_with = "pixels")]
    pub width: u32,
}

/// An annotation entry of a split file; `bbox` is `[x, y, width, height]`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AnnotationRecord {
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: [f64; 4],
}

#[derive(Deserialize)]
struct SplitFile {
    images: Vec<ImageRecord>,
    #[serde(default)]
    annotations: Vec<AnnotationRecord>,
}

// Some exports write dimensions as floats.
fn pixels<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "invalid pixel dimension {}",
            value
        )));
    }
    Ok(value as u32)
}

/// Lookup tables for one split, keyed by image filename.
#[derive(Clone, Debug)]
pub struct SplitIndex {
    split: Split,
    images: Vec<ImageRecord>,
    annotations: HashMap<String, Vec<AnnotationRecord>>,
}

impl SplitIndex {
    /// Reads and indexes a split file.
    pub fn read<P: AsRef<Path>>(split: Split, path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        Self::from_reader(split, reader, path)
    }

    /// Indexes a split read from `reader`; `path` is only used in error
    /// messages.
    pub fn from_reader<R: Read>(split: Split, reader: R, path: &Path) -> Result<Self, Error> {
        let file: SplitFile = serde_json::from_reader(reader).map_err(|err| Error::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let mut id_to_name: HashMap<u64, String> = HashMap::with_capacity(file.images.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(file.images.len());
        let mut images = Vec::with_capacity(file.images.len());

        for image in file.images {
            id_to_name.insert(image.id, image.file_name.clone());
            if seen.insert(image.file_name.clone()) {
                images.push(image);
            } else {
                warn!(
                    "{}: image '{}' listed more than once, keeping the first entry",
                    split, image.file_name
                );
            }
        }

        let mut annotations: HashMap<String, Vec<AnnotationRecord>> = HashMap::new();
        for ann in file.annotations {
            let name = id_to_name
                .get(&ann.image_id)
                .ok_or_else(|| Error::UnknownImageId {
                    split: split.name().to_owned(),
                    image_id: ann.image_id,
                })?;
            annotations.entry(name.clone()).or_default().push(ann);
        }

        debug!(
            "{}: {} images, {} annotated",
            split,
            images.len(),
            annotations.len()
        );

        Ok(SplitIndex {
            split,
            images,
            annotations,
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }

    /// Images in file order, one entry per distinct filename.
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// Annotations of an image, empty when it has none.
    pub fn annotations(&self, file_name: &str) -> &[AnnotationRecord] {
        self.annotations
            .get(file_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.values().map(Vec::len).sum()
    }
}
