use serde::{Deserialize, Serialize};

pub use crate::model::error::{BackendError, ErrorKind, FsError};

/// One stored object as reported by a backing bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileObject {
    pub id: Option<String>,
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
    /// Milliseconds since the unix epoch.
    pub upload_timestamp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
}

/// The uniform record every metadata-returning operation hands back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub mimetype: Option<String>,
    pub path: String,
    /// Seconds since the unix epoch.
    pub timestamp: i64,
    pub size: u64,
}

impl From<&FileObject> for FileMetadata {
    fn from(file: &FileObject) -> Self {
        Self {
            kind: ObjectType::File,
            mimetype: file.content_type.clone(),
            path: file.name.clone(),
            timestamp: millis_to_secs(file.upload_timestamp),
            size: file.size,
        }
    }
}

/// Rounds half away from zero.
pub fn millis_to_secs(millis: i64) -> i64 {
    if millis >= 0 {
        millis.saturating_add(500) / 1000
    } else {
        millis.saturating_sub(500) / 1000
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteConfig {
    pub content_type: Option<String>,
}

impl WriteConfig {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemporaryUrlOptions {
    pub content_disposition: Option<String>,
}
