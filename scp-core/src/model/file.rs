use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request value selecting every downloadable file of a study.
pub const ALL_FILES: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Uploaded,
    Uploading,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyFile {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub file_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub human_data: bool,
    #[serde(default)]
    pub status: FileStatus,
}

impl StudyFile {
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        self.status == FileStatus::Uploaded && !self.human_data
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// A directory of files synced from the study's storage bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub files: Vec<ListedFile>,
}

/// A file to sign, with the path it should be written to locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub name: String,
    pub output: String,
    pub size: u64,
}

/// Resolves the `download_object` of a bulk request to files. Study files are
/// only included for `all`; synced directories are included for `all` or when
/// named directly.
#[must_use]
pub fn downloadable_files(
    study_accession: &str,
    files: &[StudyFile],
    listings: &[DirectoryListing],
    download_object: &str,
) -> Vec<Download> {
    let everything = download_object == ALL_FILES;

    let study_files = files
        .iter()
        .filter(|_| everything)
        .filter(|f| f.is_downloadable())
        .map(|f| Download {
            name: f.name.clone(),
            output: format!("{study_accession}/{}", f.name),
            size: f.size,
        });

    let listed_files = listings
        .iter()
        .filter(|l| l.synced && (everything || l.name == download_object))
        .flat_map(|l| l.files.iter())
        .map(|f| Download {
            name: f.name.clone(),
            output: format!("{study_accession}/{}", f.name),
            size: f.size,
        });

    study_files.chain(listed_files).collect()
}
