// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Reader for the image characteristics table.
//!
//! The table is a CSV file with a header row and one row per image. Column 2
//! holds the image filename and the last four columns hold the per-image
//! tags: item density, bounding box occupation, average relative object size
//! and average occlusion level.

use crate::{
    Error,
    dataset::{
        ProjectMeta, TAG_AVERAGE_OCCLUSION, TAG_AVERAGE_RELATIVE_SIZE, TAG_BBOXES_OCCUPATION,
        TAG_ITEM_DENSITY, Tag, TagValue,
    },
};
use log::debug;
use std::{collections::HashMap, fs::File, io::Read, path::Path};

const FILENAME_COLUMN: usize = 2;
const TAG_COLUMNS: usize = 4;

/// The four tag values of one image, in table order.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTags {
    pub item_density: String,
    pub bboxes_occupation: f64,
    pub average_relative_size: f64,
    pub average_occlusion: f64,
}

impl ImageTags {
    /// Binds the values to the tag definitions of `meta`.
    pub fn to_tags(&self, meta: &ProjectMeta) -> Result<Vec<Tag>, Error> {
        let values = [
            (TAG_ITEM_DENSITY, TagValue::String(self.item_density.clone())),
            (TAG_BBOXES_OCCUPATION, TagValue::Number(self.bboxes_occupation)),
            (
                TAG_AVERAGE_RELATIVE_SIZE,
                TagValue::Number(self.average_relative_size),
            ),
            (TAG_AVERAGE_OCCLUSION, TagValue::Number(self.average_occlusion)),
        ];

        values
            .into_iter()
            .map(|(name, value)| {
                let tag_meta = meta.tag(name).ok_or_else(|| {
                    Error::InvalidParameters(format!("project meta has no tag '{}'", name))
                })?;
                Ok(Tag::new(tag_meta, value))
            })
            .collect()
    }
}

/// Filename-keyed lookup of [`ImageTags`].
#[derive(Clone, Debug, Default)]
pub struct TagTable {
    rows: HashMap<String, ImageTags>,
}

impl TagTable {
    /// Reads the table from a CSV file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::from_reader(file, path)?;
        debug!(
            "Loaded tags for {} images from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Reads the table from any reader; `path` is only used in error
    /// messages.
    pub fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = HashMap::new();

        // Row 0 is the header, whatever it contains.
        for (index, record) in csv_reader.records().enumerate().skip(1) {
            let record = record?;
            let parse_error = |message: String| Error::Parse {
                path: path.to_path_buf(),
                message: format!("row {}: {}", index, message),
            };

            if record.len() < TAG_COLUMNS.max(FILENAME_COLUMN + 1) {
                return Err(parse_error(format!(
                    "expected at least {} columns, found {}",
                    TAG_COLUMNS,
                    record.len()
                )));
            }

            let file_name = record[FILENAME_COLUMN].to_string();
            let tail = record.len() - TAG_COLUMNS;
            let number = |offset: usize| -> Result<f64, Error> {
                let raw = record[tail + offset].trim();
                raw.parse::<f64>()
                    .map_err(|_| parse_error(format!("'{}' is not a number", raw)))
            };

            let tags = ImageTags {
                item_density: record[tail].to_string(),
                bboxes_occupation: number(1)?,
                average_relative_size: number(2)?,
                average_occlusion: number(3)?,
            };
            rows.insert(file_name, tags);
        }

        Ok(TagTable { rows })
    }

    /// Looks up the tags of an image; a missing row is an error.
    pub fn get(&self, file_name: &str) -> Result<&ImageTags, Error> {
        self.rows
            .get(file_name)
            .ok_or_else(|| Error::MissingTags(file_name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str) -> Result<TagTable, Error> {
        TagTable::from_reader(csv.as_bytes(), Path::new("image_characteristics.csv"))
    }

    #[test]
    fn test_lookup_returns_last_four_columns() {
        let table = parse(
            "field,idx,image,width,item_density,bbox_occupation,avg_size,avg_occlusion\n\
             f1,0,img1.jpg,1920,dense,0.5,0.2,0.1\n\
             f1,1,img2.jpg,1920,sparse,0.05,0.01,0\n",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("img1.jpg").unwrap(),
            &ImageTags {
                item_density: "dense".to_owned(),
                bboxes_occupation: 0.5,
                average_relative_size: 0.2,
                average_occlusion: 0.1,
            }
        );
        assert_eq!(table.get("img2.jpg").unwrap().item_density, "sparse");
        assert_eq!(table.get("img2.jpg").unwrap().average_occlusion, 0.0);
    }

    #[test]
    fn test_header_is_skipped_even_if_it_looks_like_data() {
        let table = parse("a,b,img0.jpg,low,1,2,3\na,b,img1.jpg,high,4,5,6\n").unwrap();
        assert_eq!(table.len(), 1);
        assert!(matches!(table.get("img0.jpg"), Err(Error::MissingTags(_))));
        assert_eq!(table.get("img1.jpg").unwrap().average_occlusion, 6.0);
    }

    #[test]
    fn test_missing_row_is_named() {
        let table = parse("h\n").unwrap();
        assert!(table.is_empty());
        match table.get("nope.jpg") {
            Err(Error::MissingTags(name)) => assert_eq!(name, "nope.jpg"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_tag_is_a_parse_error() {
        let err = parse("h\na,b,img1.jpg,dense,lots,0.2,0.1\n").unwrap_err();
        match err {
            Error::Parse { message, .. } => assert!(message.contains("row 1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_short_row_is_a_parse_error() {
        assert!(matches!(
            parse("h\na,b,img1.jpg\n"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_to_tags_follows_schema_order() {
        let table = parse("h\na,b,img1.jpg,dense,0.5,0.2,0.1\n").unwrap();
        let tags = table
            .get("img1.jpg")
            .unwrap()
            .to_tags(&ProjectMeta::lincoln_beet())
            .unwrap();
        let names: Vec<_> = tags.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                TAG_ITEM_DENSITY,
                TAG_BBOXES_OCCUPATION,
                TAG_AVERAGE_RELATIVE_SIZE,
                TAG_AVERAGE_OCCLUSION
            ]
        );
        assert_eq!(tags[0].value(), &TagValue::String("dense".to_owned()));
        assert_eq!(tags[3].value(), &TagValue::Number(0.1));
    }
}
