use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use scp_core::{
    hca::validate,
    model::project::{NewProjectMetadatum, PROJECT_ENTITY, ProjectMetadatum, project_identifier},
};
use serde_json::Value;
use uuid::Uuid;

use super::{
    context::viewable_study,
    error::{Error, Result},
    handler::ValidJson,
};
use crate::{
    db::Write,
    server::{AppState, auth::SignedIn},
};

/// Validates an HCA project payload against the project schema of the
/// requested version and stores the coerced result.
pub(super) async fn create_project_metadata(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    ValidJson(request): ValidJson<NewProjectMetadatum>,
) -> Result<(StatusCode, Json<ProjectMetadatum>)> {
    let store = app_state.store();
    let viewer = user.viewer();

    let study = viewable_study(&study_name, Some(&viewer), store).await?;
    if !study.can_edit(Some(&viewer)) {
        return Err(Error::permission(format!(
            "{} does not have permission to edit {}",
            viewer.email, study.name
        )));
    }

    let NewProjectMetadatum { version, payload } = request;

    let schemas = app_state.schemas();
    let schema = schemas.schema(&version, PROJECT_ENTITY).await?;
    let referenced = schemas.referenced_schemas(&version, &schema).await?;

    let payload = validate(&schema, &payload, &referenced).map_err(|errors| Error::SchemaValidation { errors })?;

    let slug = study.url_safe_name.clone();
    let metadatum = ProjectMetadatum {
        id: Uuid::now_v7(),
        study_id: study.id,
        name: study.name,
        project_identifier: project_identifier(app_state.config().portal_url(), &slug),
        slug,
        version,
        payload: Value::Object(payload),
        created_at: Utc::now(),
    }
    .write(store)
    .await?;

    tracing::info!(identifier = %metadatum.project_identifier, "stored project metadata");

    Ok((StatusCode::CREATED, Json(metadatum)))
}
