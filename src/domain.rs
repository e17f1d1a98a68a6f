use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

static RECORD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/\-]*$").unwrap());

static LOCAL_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9._\-]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|ch| if matches!(ch, ':' | '/') { '_' } else { ch })
            .collect()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !RECORD_ID.is_match(normalized) {
            return Err(MigrateError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub order: usize,
    pub file_id: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub filename: String,
}

impl ImageDescriptor {
    pub fn new(order: usize, file_id: &str, url: &str, mime_type: Option<&str>) -> Self {
        let mime_type = mime_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            order,
            file_id: file_id.to_string(),
            url: url.to_string(),
            filename: image_filename(file_id, mime_type.as_deref()),
            mime_type,
        }
    }

    /// False when the name taken from the record could leave the media directory.
    pub fn has_local_filename(&self) -> bool {
        is_local_filename(&self.filename)
    }
}

pub fn is_local_filename(name: &str) -> bool {
    LOCAL_FILENAME.is_match(name) && !name.contains("..")
}

pub fn image_filename(file_id: &str, mime_type: Option<&str>) -> String {
    format!("{file_id}.{}", image_extension(mime_type))
}

fn image_extension(mime_type: Option<&str>) -> &str {
    let Some(mime_type) = mime_type.map(str::trim).filter(|value| !value.is_empty()) else {
        return "jpg";
    };
    let subtype = mime_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .unwrap_or(mime_type);
    match subtype {
        "" | "jpeg" | "pjpeg" => "jpg",
        other => other,
    }
}
