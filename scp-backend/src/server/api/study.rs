use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use scp_core::model::{
    Pagination,
    file::{DirectoryListing, StudyFile},
    study::{NewStudy, SettingsChange, Study, StudyOrder, StudySettings},
};
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use super::{
    context::{AnnotationOptions, annotation_options, load_cluster, viewable_study, viewer},
    error::{Error, Result},
    handler::{QueryParams, ValidJson},
};
use crate::{
    db::{
        Write,
        model::{
            cluster::fetch_clusters,
            expression::{fetch_gene_names, fetch_precomputed_scores},
            file::{fetch_directories, fetch_files},
            study::{StudyCreation, fetch_viewable_studies, record_view, search_studies},
        },
    },
    server::{AppState, auth::SignedIn},
};

#[derive(Debug, Default, Deserialize, Valuable)]
#[serde(default)]
pub(super) struct IndexQuery {
    order: Option<StudyOrder>,
    search_terms: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct StudyIndex {
    studies: Vec<Study>,
    study_count: usize,
    cell_count: u64,
    page: usize,
    per_page: usize,
}

pub(super) async fn index(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    QueryParams(query): QueryParams<IndexQuery>,
) -> Result<Json<StudyIndex>> {
    tracing::debug!(deserialized_query = query.as_value());

    let viewer = viewer(user.as_ref());
    let mut studies = fetch_viewable_studies(viewer.as_ref(), app_state.store()).await?;

    if let Some(terms) = &query.search_terms {
        studies = search_studies(studies, terms);
    }
    query.order.unwrap_or_default().sort(&mut studies);

    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page).max(1),
        per_page: query.per_page.unwrap_or(defaults.per_page).max(1),
    };

    let study_count = studies.len();
    let cell_count = studies.iter().map(|s| s.cell_count).sum();

    Ok(Json(StudyIndex {
        studies: pagination.paginate(studies),
        study_count,
        cell_count,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

pub(super) async fn list(user: Option<SignedIn>, State(app_state): State<AppState>) -> Result<Json<Vec<Study>>> {
    let viewer = viewer(user.as_ref());
    let mut studies = fetch_viewable_studies(viewer.as_ref(), app_state.store()).await?;
    StudyOrder::Default.sort(&mut studies);

    Ok(Json(studies))
}

pub(super) async fn create(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
    ValidJson(study): ValidJson<NewStudy>,
) -> Result<(StatusCode, Json<Study>)> {
    tracing::info!(study = %study.name, user = %user.email, "creating study");

    let study = StudyCreation {
        study,
        user_id: user.id,
    }
    .write(app_state.store())
    .await?;

    Ok((StatusCode::CREATED, Json(study)))
}

pub(super) async fn fetch(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
) -> Result<Json<Study>> {
    let viewer = viewer(user.as_ref());

    Ok(Json(viewable_study(&study_name, viewer.as_ref(), app_state.store()).await?))
}

#[derive(Debug, Serialize)]
pub(super) struct SettingsUpdate {
    study: Study,
    #[serde(flatten)]
    change: SettingsChange,
}

pub(super) async fn update_settings(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    ValidJson(settings): ValidJson<StudySettings>,
) -> Result<Json<SettingsUpdate>> {
    let viewer = user.viewer();
    let store = app_state.store();

    let mut study = viewable_study(&study_name, Some(&viewer), store).await?;
    if !study.can_edit(Some(&viewer)) {
        return Err(Error::permission(format!("you do not have permission to edit {study_name}")));
    }

    let change = study.apply_settings(settings);
    store.replace(&study).await?;

    tracing::info!(study = %study.url_safe_name, ?change, "updated study settings");

    Ok(Json(SettingsUpdate { study, change }))
}

#[derive(Debug, Serialize)]
pub(super) struct StudyOverview {
    study: Study,
    clusters: Vec<String>,
    default_cluster: Option<String>,
    default_annotation: Option<String>,
    annotations: Option<AnnotationOptions>,
    files: Vec<StudyFile>,
    directories: Vec<DirectoryListing>,
    precomputed_scores: Vec<String>,
    gene_count: usize,
    can_edit: bool,
    embargoed: bool,
}

/// Everything the study page needs on first load. Counts as a view.
pub(super) async fn overview(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
) -> Result<Json<StudyOverview>> {
    let viewer = viewer(user.as_ref());
    let store = app_state.store();

    let study = viewable_study(&study_name, viewer.as_ref(), store).await?;
    let study = record_view(study, store).await?;

    let clusters = fetch_clusters(&study.id, store).await?;
    let default_cluster = load_cluster(&study, None, store).await.ok();
    let annotations = match &default_cluster {
        Some(cluster) => Some(annotation_options(&study, cluster, viewer.as_ref(), store).await?),
        None => None,
    };

    let files = fetch_files(&study.id, store)
        .await?
        .into_iter()
        .filter(StudyFile::is_downloadable)
        .collect();
    let directories = fetch_directories(&study.id, store)
        .await?
        .into_iter()
        .filter(|d| d.synced)
        .collect();
    let precomputed_scores = fetch_precomputed_scores(&study.id, store)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    let gene_count = fetch_gene_names(&study.id, store).await?.len();

    Ok(Json(StudyOverview {
        clusters: clusters.into_iter().map(|c| c.name).collect(),
        default_cluster: default_cluster.map(|c| c.name),
        default_annotation: study.default_annotation().map(ToString::to_string),
        annotations,
        files,
        directories,
        precomputed_scores,
        gene_count,
        can_edit: study.can_edit(viewer.as_ref()),
        embargoed: study.embargoed(viewer.as_ref(), Utc::now().date_naive()),
        study,
    }))
}
