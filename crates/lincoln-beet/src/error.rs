// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Lincoln Beet Converter Contributors. All Rights Reserved.

use std::path::PathBuf;

/// Error type for every stage of the Lincoln Beet conversion pipeline.
///
/// Acquisition (download and unpack), parsing of the source annotation files
/// and the remote platform calls all report through this enum. None of the
/// variants are recovered from inside the pipeline: the first error aborts
/// the run.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// CSV reader error.
    CsvError(csv::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// Zip archive could not be read or extracted.
    ZipError(zip::result::ZipError),
    /// Integer parsing error.
    ParseIntError(std::num::ParseIntError),
    /// A source annotation file is malformed.
    Parse { path: PathBuf, message: String },
    /// An image filename has no row in the image characteristics table.
    MissingTags(String),
    /// An annotation references an image id absent from its split.
    UnknownImageId { split: String, image_id: u64 },
    /// An annotation uses a category id outside the fixed class table.
    UnknownCategory(u64),
    /// The configured download source cannot be resolved.
    InvalidSource(String),
    /// The settings are incomplete or inconsistent.
    InvalidSettings(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// The platform API returned an error with a status code and message.
    RpcError(u16, String),
    /// Server returned an invalid or unexpected response.
    InvalidResponse,
    /// The platform API token is empty or not provided.
    EmptyToken,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::CsvError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipError(err)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseIntError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::CsvError(e) => write!(f, "CSV error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::ZipError(e) => write!(f, "Zip archive error: {}", e),
            Error::ParseIntError(e) => write!(f, "Integer parse error: {}", e),
            Error::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            Error::MissingTags(name) => {
                write!(f, "Image '{}' has no entry in the characteristics table", name)
            }
            Error::UnknownImageId { split, image_id } => write!(
                f,
                "Annotation in split '{}' references unknown image id {}",
                split, image_id
            ),
            Error::UnknownCategory(id) => write!(f, "Unknown category id: {}", id),
            Error::InvalidSource(s) => write!(f, "Invalid download source: {}", s),
            Error::InvalidSettings(s) => write!(f, "Invalid settings: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            Error::RpcError(code, msg) => write!(f, "API error {}: {}", code, msg),
            Error::InvalidResponse => write!(f, "Invalid server response"),
            Error::EmptyToken => write!(f, "API token is empty"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::CsvError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::ZipError(e) => Some(e),
            Error::ParseIntError(e) => Some(e),
            _ => None,
        }
    }
}
