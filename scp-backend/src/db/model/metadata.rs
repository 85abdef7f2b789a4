use bson::doc;
use scp_core::model::{annotation::AnnotationType, metadata::StudyMetadatum};
use uuid::Uuid;

use crate::db::{Store, Stored, by_study, error, uuid_filter};

impl Stored for StudyMetadatum {
    const COLLECTION: &'static str = "study_metadata";

    fn id(&self) -> Uuid {
        self.id
    }
}

pub async fn fetch_study_metadata(study_id: &Uuid, store: &Store) -> error::Result<Vec<StudyMetadatum>> {
    store.find(by_study(study_id)).await
}

pub async fn fetch_metadatum(
    study_id: &Uuid,
    name: &str,
    annotation_type: AnnotationType,
    store: &Store,
) -> error::Result<Option<StudyMetadatum>> {
    let candidates: Vec<StudyMetadatum> = store
        .find(doc! { "study_id": uuid_filter(study_id), "name": name })
        .await?;

    Ok(candidates.into_iter().find(|m| m.annotation_type == annotation_type))
}
