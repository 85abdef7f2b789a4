use bson::doc;
use scp_core::model::{
    annotation::CellValue,
    cluster::ClusterGroup,
    data_array::{ArrayOwner, ArrayQuery, DataArray, concatenate},
};
use uuid::Uuid;

use crate::db::{Store, Stored, by_study, error, uuid_filter};

impl Stored for ClusterGroup {
    const COLLECTION: &'static str = "cluster_groups";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Stored for DataArray {
    const COLLECTION: &'static str = "data_arrays";

    fn id(&self) -> Uuid {
        self.id
    }
}

pub async fn fetch_clusters(study_id: &Uuid, store: &Store) -> error::Result<Vec<ClusterGroup>> {
    store.find(by_study(study_id)).await
}

pub async fn fetch_cluster(study_id: &Uuid, name: &str, store: &Store) -> error::Result<Option<ClusterGroup>> {
    store
        .find_one(doc! { "study_id": uuid_filter(study_id), "name": name })
        .await
}

/// Loads every chunk of one logical array and joins them.
pub async fn fetch_array(owner: &ArrayOwner, query: &ArrayQuery, store: &Store) -> error::Result<Vec<CellValue>> {
    let filter = doc! {
        "study_id": uuid_filter(&owner.study_id),
        "linear_data_id": uuid_filter(&owner.linear_data_id),
        "name": query.name.as_str(),
        "array_type": query.array_type.to_string(),
    };

    let arrays: Vec<DataArray> = store.find(filter).await?;

    Ok(concatenate(arrays, query))
}

#[must_use]
pub fn cluster_owner(cluster: &ClusterGroup) -> ArrayOwner {
    ArrayOwner {
        study_id: cluster.study_id,
        linear_data_id: cluster.id,
        linear_data_type: scp_core::model::data_array::LinearDataType::ClusterGroup,
    }
}
