use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::ids::{ProjectId, RealtorId};
use crate::errors::DomainError;

/// Catalog entry of a realtor's project, as the interest and files
/// sub-agents see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: ProjectId,
    pub realtor_id: RealtorId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Image,
    Video,
    Kmz,
    Document,
}

impl FileType {
    pub const ALL: [FileType; 4] =
        [FileType::Image, FileType::Video, FileType::Kmz, FileType::Document];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Kmz => "kmz",
            FileType::Document => "document",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "kmz" => Ok(FileType::Kmz),
            "document" => Ok(FileType::Document),
            other => Err(DomainError::UnknownFileType(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub project_id: ProjectId,
    pub file_type: FileType,
    pub url: String,
}
