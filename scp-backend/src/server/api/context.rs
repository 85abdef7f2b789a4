//! Lookups shared by most study routes: the study itself with its permission
//! check, the cluster being shown and the annotation cells are grouped by.

use scp_core::{
    model::{
        annotation::{AnnotationScope, AnnotationSelector, AnnotationSource, AnnotationType, SelectedAnnotation},
        cluster::ClusterGroup,
        data_array::{ArrayOwner, ArrayQuery, ArrayType, CELLS_ARRAY, numeric, text},
        metadata::StudyMetadatum,
        study::{Study, Viewer},
        user_annotation::UserAnnotation,
    },
    plot::traces::PointData,
};
use serde::Serialize;
use uuid::Uuid;

use super::error::{Error, Result};
use crate::{
    db::{
        self, Store,
        model::{
            cluster::{cluster_owner, fetch_array, fetch_clusters},
            metadata::{fetch_metadatum, fetch_study_metadata},
            study::fetch_study,
            user_annotation::{fetch_user_annotation, fetch_user_annotations},
        },
    },
    server::auth::SignedIn,
};

pub(super) fn viewer(user: Option<&SignedIn>) -> Option<Viewer> {
    user.map(|SignedIn(user)| user.viewer())
}

/// Loads a study the viewer is allowed to see.
pub(super) async fn viewable_study(study_name: &str, viewer: Option<&Viewer>, store: &Store) -> Result<Study> {
    let study = fetch_study(study_name, store).await.map_err(|err| match err {
        db::error::Error::RecordNotFound => Error::not_found(format!("study {study_name}")),
        other => other.into(),
    })?;

    if !study.can_view(viewer) {
        return Err(Error::permission(format!(
            "you do not have permission to view {study_name}"
        )));
    }

    Ok(study)
}

/// The requested cluster, else the study default, else the first one.
pub(super) async fn load_cluster(study: &Study, requested: Option<&str>, store: &Store) -> Result<ClusterGroup> {
    let mut clusters = fetch_clusters(&study.id, store).await?;

    let index = match requested {
        Some(name) => clusters.iter().position(|c| c.name == name),
        None => study
            .default_cluster()
            .and_then(|default| clusters.iter().position(|c| c.name == default))
            .or((!clusters.is_empty()).then_some(0)),
    };

    match index {
        Some(index) => Ok(clusters.swap_remove(index)),
        None => Err(Error::not_found(format!(
            "cluster {}",
            requested.unwrap_or("(none)")
        ))),
    }
}

#[derive(Debug, Clone)]
pub(super) enum AnnotationKind {
    Cluster,
    User(UserAnnotation),
    Study(StudyMetadatum),
}

#[derive(Debug, Clone)]
pub(super) struct ResolvedAnnotation {
    pub selected: SelectedAnnotation,
    pub kind: AnnotationKind,
}

impl ResolvedAnnotation {
    pub(super) fn selector(&self) -> String {
        self.selected.subsample_key()
    }
}

async fn default_selector(study: &Study, cluster: &ClusterGroup, store: &Store) -> Result<String> {
    if let Some(annotation) = study.default_annotation() {
        return Ok(annotation.to_string());
    }

    if let Some(annotation) = cluster.cell_annotations.first() {
        return Ok(format!("{}--{}--cluster", annotation.name, annotation.annotation_type));
    }

    let metadata = fetch_study_metadata(&study.id, store).await?;
    metadata
        .first()
        .map(|m| format!("{}--{}--study", m.name, m.annotation_type))
        .ok_or_else(|| Error::not_found("annotation"))
}

/// Resolves a `name--type--scope` selector, defaulting to the study's default annotation.
pub(super) async fn resolve_annotation(
    study: &Study,
    cluster: &ClusterGroup,
    requested: Option<&str>,
    viewer: Option<&Viewer>,
    store: &Store,
) -> Result<ResolvedAnnotation> {
    let raw = match requested.filter(|r| !r.is_empty()) {
        Some(raw) => raw.to_string(),
        None => default_selector(study, cluster, store).await?,
    };
    let AnnotationSelector {
        name,
        annotation_type,
        scope,
    } = raw.parse()?;

    let missing = || Error::not_found(format!("annotation {raw}"));

    let resolved = match scope {
        AnnotationScope::Cluster => {
            let annotation = cluster.cell_annotation(&name, annotation_type).ok_or_else(missing)?;

            ResolvedAnnotation {
                selected: SelectedAnnotation {
                    name,
                    annotation_type,
                    scope,
                    id: None,
                    values: annotation.values.clone(),
                },
                kind: AnnotationKind::Cluster,
            }
        }
        AnnotationScope::Study => {
            let metadatum = fetch_metadatum(&study.id, &name, annotation_type, store)
                .await?
                .ok_or_else(missing)?;

            ResolvedAnnotation {
                selected: SelectedAnnotation {
                    name,
                    annotation_type,
                    scope,
                    id: None,
                    values: metadatum.values.clone(),
                },
                kind: AnnotationKind::Study(metadatum),
            }
        }
        AnnotationScope::User => {
            let id: Uuid = name.parse().map_err(|_| Error::SimpleData {
                reason: format!("'{name}' is not a user annotation id"),
            })?;
            let annotation = fetch_user_annotation(&id, store).await?.ok_or_else(missing)?;

            if !viewer.is_some_and(|v| v.id == annotation.user_id) {
                return Err(Error::permission("user annotations are only visible to their creator"));
            }

            ResolvedAnnotation {
                selected: annotation.selected(),
                kind: AnnotationKind::User(annotation),
            }
        }
    };

    Ok(resolved)
}

/// Parses the `subsample` parameter; anything that is not a number means all points.
pub(super) fn subsample_threshold(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|r| r.trim().parse().ok())
}

async fn coordinates(
    owner: &ArrayOwner,
    threshold: Option<u32>,
    key: &str,
    with_z: bool,
    store: &Store,
) -> Result<(Vec<f64>, Vec<f64>, Option<Vec<f64>>, Vec<String>)> {
    let query = |name: &str, array_type| ArrayQuery::new(name, array_type).subsampled(threshold, key);

    let x = numeric(fetch_array(owner, &query("x", ArrayType::Coordinates), store).await?);
    let y = numeric(fetch_array(owner, &query("y", ArrayType::Coordinates), store).await?);
    let z = if with_z {
        Some(numeric(fetch_array(owner, &query("z", ArrayType::Coordinates), store).await?))
    } else {
        None
    };
    let cells = text(fetch_array(owner, &query(CELLS_ARRAY, ArrayType::Cells), store).await?);

    Ok((x, y, z, cells))
}

/// Every cell of the cluster at full resolution, whatever annotation is selected.
pub(super) async fn cluster_cells(cluster: &ClusterGroup, store: &Store) -> Result<Vec<String>> {
    let query = ArrayQuery::new(CELLS_ARRAY, ArrayType::Cells);

    Ok(text(fetch_array(&cluster_owner(cluster), &query, store).await?))
}

/// Coordinates, cell names and annotation values for one rendering of a
/// cluster. Subsampled arrays fall back to full resolution when the
/// annotation has none at the requested threshold.
pub(super) async fn point_data(
    cluster: &ClusterGroup,
    annotation: &ResolvedAnnotation,
    threshold: Option<u32>,
    store: &Store,
) -> Result<PointData> {
    let owner = match &annotation.kind {
        AnnotationKind::User(user_annotation) => user_annotation.owner(),
        AnnotationKind::Cluster | AnnotationKind::Study(_) => cluster_owner(cluster),
    };
    let key = annotation.selector();
    let with_z = cluster.is_3d();

    let mut threshold = threshold;
    let mut loaded = coordinates(&owner, threshold, &key, with_z, store).await?;
    if threshold.is_some() && loaded.3.is_empty() {
        threshold = None;
        loaded = coordinates(&owner, None, &key, with_z, store).await?;
    }
    let (x, y, z, cells) = loaded;

    let annotations = match &annotation.kind {
        AnnotationKind::Study(metadatum) => AnnotationSource::ByCell(metadatum.cell_values.clone()),
        AnnotationKind::Cluster | AnnotationKind::User(_) => {
            let query = ArrayQuery::new(&annotation.selected.name, ArrayType::Annotations).subsampled(threshold, &key);
            AnnotationSource::Aligned(fetch_array(&owner, &query, store).await?)
        }
    };

    Ok(PointData {
        x,
        y,
        z,
        cells,
        annotations,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct AnnotationOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(super) struct AnnotationOptions {
    pub cluster: Vec<AnnotationOption>,
    pub study: Vec<AnnotationOption>,
    pub user: Vec<AnnotationOption>,
}

/// Every annotation that can group the cells of `cluster`. User annotations
/// are only offered to their creator.
pub(super) async fn annotation_options(
    study: &Study,
    cluster: &ClusterGroup,
    viewer: Option<&Viewer>,
    store: &Store,
) -> Result<AnnotationOptions> {
    let option = |name: &str, annotation_type: AnnotationType, scope: &str| AnnotationOption {
        label: name.to_string(),
        value: format!("{name}--{annotation_type}--{scope}"),
    };

    let cluster_options = cluster
        .cell_annotations
        .iter()
        .map(|a| option(&a.name, a.annotation_type, "cluster"))
        .collect();

    let study_options = fetch_study_metadata(&study.id, store)
        .await?
        .iter()
        .map(|m| option(&m.name, m.annotation_type, "study"))
        .collect();

    let user_options = match viewer {
        Some(viewer) => fetch_user_annotations(&cluster.id, &viewer.id, store)
            .await?
            .iter()
            .map(|a| AnnotationOption {
                label: a.name.clone(),
                value: a.identifier(),
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(AnnotationOptions {
        cluster: cluster_options,
        study: study_options,
        user: user_options,
    })
}
