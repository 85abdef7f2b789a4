use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Endpoint;

pub const PROJECT_ENTITY: &str = "project";

#[must_use]
pub fn project_identifier(portal_url: &str, slug: &str) -> String {
    format!("{}/single_cell/study/{slug}", portal_url.trim_end_matches('/'))
}

/// An HCA project record. `payload` has been validated and coerced against the
/// `project` schema of `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadatum {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub slug: String,
    pub version: String,
    pub project_identifier: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProjectMetadatum {
    #[garde(length(min = 1))]
    pub version: String,
    #[garde(skip)]
    pub payload: Map<String, Value>,
}

impl Endpoint for NewProjectMetadatum {
    fn endpoint() -> String {
        "/study/{study_name}/project_metadata".to_string()
    }
}
