use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use scp_core::model::{
    data_array::{ArrayOwner, ArrayQuery, ArrayType, CELLS_ARRAY},
    user_annotation::{ClusterArrays, NewUserAnnotation, UserAnnotation},
};

use super::{
    context::{viewable_study, viewer},
    error::{Error, Result},
    handler::ValidJson,
};
use crate::{
    db::{
        Store, Write,
        model::{
            cluster::{cluster_owner, fetch_array, fetch_cluster},
            user_annotation::UserAnnotationCreation,
        },
    },
    server::{AppState, auth::SignedIn},
};

async fn cluster_arrays(
    owner: &ArrayOwner,
    threshold: Option<u32>,
    key: &str,
    with_z: bool,
    store: &Store,
) -> Result<ClusterArrays> {
    let query = |name: &str, array_type| ArrayQuery::new(name, array_type).subsampled(threshold, key);

    let z = if with_z {
        Some(fetch_array(owner, &query("z", ArrayType::Coordinates), store).await?)
    } else {
        None
    };

    Ok(ClusterArrays {
        x: fetch_array(owner, &query("x", ArrayType::Coordinates), store).await?,
        y: fetch_array(owner, &query("y", ArrayType::Coordinates), store).await?,
        z,
        cells: fetch_array(owner, &query(CELLS_ARRAY, ArrayType::Cells), store).await?,
    })
}

/// Saves the cell selections a signed-in viewer drew on a cluster as a new
/// group annotation owned by them.
pub(super) async fn create(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    ValidJson(request): ValidJson<NewUserAnnotation>,
) -> Result<(StatusCode, Json<UserAnnotation>)> {
    let store = app_state.store();
    let viewer = user.viewer();

    let study = viewable_study(&study_name, Some(&viewer), store).await?;
    let cluster = fetch_cluster(&study.id, &request.cluster, store)
        .await?
        .ok_or_else(|| Error::not_found(format!("cluster {}", request.cluster)))?;

    let owner = cluster_owner(&cluster);
    let key = request.subsample_annotation.clone().unwrap_or_default();

    let mut arrays = cluster_arrays(&owner, request.subsample_threshold, &key, cluster.is_3d(), store).await?;
    if request.subsample_threshold.is_some() && arrays.cells.is_empty() {
        arrays = cluster_arrays(&owner, None, &key, cluster.is_3d(), store).await?;
    }

    if arrays.cells.is_empty() {
        return Err(Error::SimpleData {
            reason: format!("cluster {} has no cells", cluster.name),
        });
    }

    let (annotation, arrays) = request.build(study.id, user.id, cluster.id, arrays);
    let annotation = UserAnnotationCreation { annotation, arrays }.write(store).await?;

    tracing::info!(study = %study.url_safe_name, annotation = %annotation.name, "created user annotation");

    Ok((StatusCode::CREATED, Json(annotation)))
}
