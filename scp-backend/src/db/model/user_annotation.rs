use bson::doc;
use scp_core::model::{data_array::DataArray, user_annotation::UserAnnotation};
use uuid::Uuid;

use crate::db::{Store, Stored, Write, by_id, error, uuid_filter};

impl Stored for UserAnnotation {
    const COLLECTION: &'static str = "user_annotations";

    fn id(&self) -> Uuid {
        self.id
    }
}

pub async fn fetch_user_annotation(id: &Uuid, store: &Store) -> error::Result<Option<UserAnnotation>> {
    store.find_one(by_id(id)).await
}

/// Annotations `user_id` drew on a cluster.
pub async fn fetch_user_annotations(
    cluster_group_id: &Uuid,
    user_id: &Uuid,
    store: &Store,
) -> error::Result<Vec<UserAnnotation>> {
    store
        .find(doc! { "cluster_group_id": uuid_filter(cluster_group_id), "user_id": uuid_filter(user_id) })
        .await
}

pub struct UserAnnotationCreation {
    pub annotation: UserAnnotation,
    pub arrays: Vec<DataArray>,
}

impl Write for UserAnnotationCreation {
    type Returns = UserAnnotation;

    async fn write(self, store: &Store) -> error::Result<Self::Returns> {
        let Self { annotation, arrays } = self;

        let existing: Option<UserAnnotation> = store
            .find_one(doc! {
                "study_id": uuid_filter(&annotation.study_id),
                "user_id": uuid_filter(&annotation.user_id),
                "name": annotation.name.as_str(),
            })
            .await?;

        if existing.is_some() {
            return Err(error::Error::DuplicateRecord {
                entity: UserAnnotation::COLLECTION.to_string(),
                field: Some("name".to_string()),
                value: Some(annotation.name),
            });
        }

        store.insert(&annotation).await?;
        store.insert_many(&arrays).await?;

        Ok(annotation)
    }
}
