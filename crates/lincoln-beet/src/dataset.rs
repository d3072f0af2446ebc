// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

//! Annotation and schema types sent to the platform.
//!
//! The schema of a project is a [`ProjectMeta`]: the object classes labels
//! may use and the tag definitions images may carry. Each uploaded image gets
//! one [`Annotation`] holding its size, its labels and its tags.

use crate::Error;
use serde::{Serialize, Serializer};
use std::fmt::Display;

/// Class title for COCO category 0.
pub const SUGAR_BEET: &str = "sugar_beet";
/// Class title for COCO category 1.
pub const WEED: &str = "weed";

pub const TAG_ITEM_DENSITY: &str = "item_density";
pub const TAG_BBOXES_OCCUPATION: &str = "bboxes_occupation";
pub const TAG_AVERAGE_RELATIVE_SIZE: &str = "average_relative_size";
pub const TAG_AVERAGE_OCCLUSION: &str = "average_levels_occlusion";

/// Geometry kind an object class accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GeometryType {
    #[serde(rename = "rectangle")]
    Rectangle,
    /// Unconstrained: labels of any geometry are accepted.
    #[serde(rename = "any")]
    AnyGeometry,
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GeometryType::Rectangle => write!(f, "rectangle"),
            GeometryType::AnyGeometry => write!(f, "any"),
        }
    }
}

/// Named object category with its geometry kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObjClass {
    title: String,
    shape: GeometryType,
    color: String,
}

impl ObjClass {
    pub fn new(title: &str, shape: GeometryType, color: &str) -> Self {
        ObjClass {
            title: title.to_owned(),
            shape,
            color: color.to_owned(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn shape(&self) -> GeometryType {
        self.shape
    }
}

/// Value type of a tag definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValueType {
    AnyString,
    AnyNumber,
}

/// Named, typed per-image metadata field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagMeta {
    name: String,
    value_type: TagValueType,
}

impl TagMeta {
    pub fn new(name: &str, value_type: TagValueType) -> Self {
        TagMeta {
            name: name.to_owned(),
            value_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> TagValueType {
        self.value_type
    }
}

/// Project schema: object classes plus tag definitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProjectMeta {
    classes: Vec<ObjClass>,
    tags: Vec<TagMeta>,
}

impl ProjectMeta {
    pub fn new(classes: Vec<ObjClass>, tags: Vec<TagMeta>) -> Self {
        ProjectMeta { classes, tags }
    }

    /// The fixed Lincoln Beet schema: two classes and four image tags.
    pub fn lincoln_beet() -> Self {
        ProjectMeta {
            classes: vec![
                ObjClass::new(SUGAR_BEET, GeometryType::Rectangle, "#3CB44B"),
                ObjClass::new(WEED, GeometryType::AnyGeometry, "#E6194B"),
            ],
            tags: vec![
                TagMeta::new(TAG_ITEM_DENSITY, TagValueType::AnyString),
                TagMeta::new(TAG_BBOXES_OCCUPATION, TagValueType::AnyNumber),
                TagMeta::new(TAG_AVERAGE_RELATIVE_SIZE, TagValueType::AnyNumber),
                TagMeta::new(TAG_AVERAGE_OCCLUSION, TagValueType::AnyNumber),
            ],
        }
    }

    pub fn classes(&self) -> &[ObjClass] {
        &self.classes
    }

    pub fn tags(&self) -> &[TagMeta] {
        &self.tags
    }

    pub fn class(&self, title: &str) -> Option<&ObjClass> {
        self.classes.iter().find(|c| c.title == title)
    }

    pub fn tag(&self, name: &str) -> Option<&TagMeta> {
        self.tags.iter().find(|t| t.name == name)
    }

    /// Maps a COCO category id of the source annotations to its class.
    pub fn class_for_category(&self, category_id: u64) -> Result<&ObjClass, Error> {
        let title = match category_id {
            0 => SUGAR_BEET,
            1 => WEED,
            other => return Err(Error::UnknownCategory(other)),
        };
        self.class(title).ok_or(Error::UnknownCategory(category_id))
    }
}

/// Axis-aligned rectangle given by its edges in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rectangle {
    top: i64,
    left: i64,
    bottom: i64,
    right: i64,
}

impl Rectangle {
    pub fn new(top: i64, left: i64, bottom: i64, right: i64) -> Self {
        Rectangle {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Converts a COCO `[x, y, width, height]` box into edges.
    ///
    /// Far edges are computed before truncation to whole pixels.
    pub fn from_coco_bbox(bbox: [f64; 4]) -> Self {
        let [x, y, w, h] = bbox;
        Rectangle {
            top: y as i64,
            left: x as i64,
            bottom: (y + h) as i64,
            right: (x + w) as i64,
        }
    }

    pub fn top(&self) -> i64 {
        self.top
    }

    pub fn left(&self) -> i64 {
        self.left
    }

    pub fn bottom(&self) -> i64 {
        self.bottom
    }

    pub fn right(&self) -> i64 {
        self.right
    }
}

/// One object on an image: a rectangle tagged with its class title.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    class_title: String,
    geometry: Rectangle,
}

impl Label {
    pub fn new(class: &ObjClass, geometry: Rectangle) -> Self {
        Label {
            class_title: class.title().to_owned(),
            geometry,
        }
    }

    pub fn class_title(&self) -> &str {
        &self.class_title
    }

    pub fn geometry(&self) -> &Rectangle {
        &self.geometry
    }
}

/// Value carried by an image tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Number(f64),
}

/// Image tag: a value bound to a [`TagMeta`] by name.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tag {
    name: String,
    value: TagValue,
}

impl Tag {
    pub fn new(meta: &TagMeta, value: TagValue) -> Self {
        Tag {
            name: meta.name().to_owned(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &TagValue {
        &self.value
    }
}

/// Annotation of a single image.
///
/// Serializes to the platform's annotation JSON: image size, image tags and
/// one object per label with its rectangle exterior as
/// `[[left, top], [right, bottom]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    height: u32,
    width: u32,
    labels: Vec<Label>,
    tags: Vec<Tag>,
}

impl Annotation {
    pub fn new(height: u32, width: u32, labels: Vec<Label>, tags: Vec<Tag>) -> Self {
        Annotation {
            height,
            width,
            labels,
            tags,
        }
    }

    /// Image size as `(height, width)`.
    pub fn img_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&TagValue> {
        self.tags.iter().find(|t| t.name == name).map(|t| &t.value)
    }
}

#[derive(Serialize)]
struct SizeJson {
    height: u32,
    width: u32,
}

#[derive(Serialize)]
struct PointsJson {
    exterior: [[i64; 2]; 2],
    interior: [[i64; 2]; 0],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ObjectJson<'a> {
    class_title: &'a str,
    geometry_type: GeometryType,
    points: PointsJson,
    tags: [Tag; 0],
}

#[derive(Serialize)]
struct AnnotationJson<'a> {
    description: &'a str,
    size: SizeJson,
    tags: &'a [Tag],
    objects: Vec<ObjectJson<'a>>,
}

impl Serialize for Annotation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let objects = self
            .labels
            .iter()
            .map(|label| ObjectJson {
                class_title: &label.class_title,
                geometry_type: GeometryType::Rectangle,
                points: PointsJson {
                    exterior: [
                        [label.geometry.left, label.geometry.top],
                        [label.geometry.right, label.geometry.bottom],
                    ],
                    interior: [],
                },
                tags: [],
            })
            .collect();

        AnnotationJson {
            description: "",
            size: SizeJson {
                height: self.height,
                width: self.width,
            },
            tags: &self.tags,
            objects,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rectangle_from_coco_bbox() {
        let rect = Rectangle::from_coco_bbox([10.0, 20.0, 30.0, 40.0]);
        assert_eq!(rect, Rectangle::new(20, 10, 60, 40));
    }

    #[test]
    fn test_rectangle_truncates_after_adding_extent() {
        let rect = Rectangle::from_coco_bbox([0.6, 1.5, 0.6, 0.6]);
        assert_eq!(rect.left(), 0);
        assert_eq!(rect.top(), 1);
        assert_eq!(rect.right(), 1);
        assert_eq!(rect.bottom(), 2);
    }

    #[test]
    fn test_lincoln_beet_schema() {
        let meta = ProjectMeta::lincoln_beet();
        assert_eq!(meta.classes().len(), 2);
        assert_eq!(meta.tags().len(), 4);
        assert_eq!(
            meta.class(SUGAR_BEET).map(|c| c.shape()),
            Some(GeometryType::Rectangle)
        );
        assert_eq!(
            meta.class(WEED).map(|c| c.shape()),
            Some(GeometryType::AnyGeometry)
        );
        let strings = meta
            .tags()
            .iter()
            .filter(|t| t.value_type() == TagValueType::AnyString)
            .count();
        assert_eq!(strings, 1);
    }

    #[test]
    fn test_class_for_category() {
        let meta = ProjectMeta::lincoln_beet();
        assert_eq!(meta.class_for_category(0).unwrap().title(), SUGAR_BEET);
        assert_eq!(meta.class_for_category(1).unwrap().title(), WEED);
        assert!(matches!(
            meta.class_for_category(2),
            Err(Error::UnknownCategory(2))
        ));
    }

    #[test]
    fn test_annotation_json() {
        let meta = ProjectMeta::lincoln_beet();
        let density = meta.tag(TAG_ITEM_DENSITY).unwrap();
        let occupation = meta.tag(TAG_BBOXES_OCCUPATION).unwrap();
        let ann = Annotation::new(
            100,
            200,
            vec![Label::new(
                meta.class(SUGAR_BEET).unwrap(),
                Rectangle::new(20, 10, 60, 40),
            )],
            vec![
                Tag::new(density, TagValue::String("dense".to_owned())),
                Tag::new(occupation, TagValue::Number(0.5)),
            ],
        );

        let value = serde_json::to_value(&ann).unwrap();
        assert_eq!(value["size"], json!({"height": 100, "width": 200}));
        assert_eq!(value["objects"][0]["classTitle"], "sugar_beet");
        assert_eq!(value["objects"][0]["geometryType"], "rectangle");
        assert_eq!(
            value["objects"][0]["points"]["exterior"],
            json!([[10, 20], [40, 60]])
        );
        assert_eq!(
            value["tags"],
            json!([
                {"name": "item_density", "value": "dense"},
                {"name": "bboxes_occupation", "value": 0.5}
            ])
        );
    }

    #[test]
    fn test_project_meta_json() {
        let value = serde_json::to_value(ProjectMeta::lincoln_beet()).unwrap();
        assert_eq!(value["classes"][0]["title"], "sugar_beet");
        assert_eq!(value["classes"][1]["shape"], "any");
        assert_eq!(value["tags"][0]["value_type"], "any_string");
        assert_eq!(value["tags"][3]["value_type"], "any_number");
    }
}
