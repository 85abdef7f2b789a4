use bson::doc;
use scp_core::model::file::{DirectoryListing, StudyFile};
use uuid::Uuid;

use crate::db::{Store, Stored, by_study, error, uuid_filter};

impl Stored for StudyFile {
    const COLLECTION: &'static str = "study_files";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Stored for DirectoryListing {
    const COLLECTION: &'static str = "directory_listings";

    fn id(&self) -> Uuid {
        self.id
    }
}

pub async fn fetch_files(study_id: &Uuid, store: &Store) -> error::Result<Vec<StudyFile>> {
    store.find(by_study(study_id)).await
}

pub async fn fetch_file(study_id: &Uuid, name: &str, store: &Store) -> error::Result<Option<StudyFile>> {
    store
        .find_one(doc! { "study_id": uuid_filter(study_id), "name": name })
        .await
}

pub async fn fetch_directories(study_id: &Uuid, store: &Store) -> error::Result<Vec<DirectoryListing>> {
    store.find(by_study(study_id)).await
}
