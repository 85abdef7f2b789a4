use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESSION_PREFIX: &str = "SCP";

/// Counter names used to draw accession and identifier numbers.
pub const ACCESSION_COUNTER: &str = "study_accession";
pub const IDENTIFIER_COUNTER: &str = "study_identifier";

#[must_use]
pub fn format_accession(n: u64) -> String {
    format!("{ACCESSION_PREFIX}{n}")
}

/// Public, immutable accession of a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyAccession {
    pub id: Uuid,
    pub accession: String,
    pub study_id: Uuid,
}

impl StudyAccession {
    #[must_use]
    pub fn new(n: u64, study_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            accession: format_accession(n),
            study_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyIdentifier {
    pub id: Uuid,
    pub identifier: String,
    pub study_id: Uuid,
}

impl StudyIdentifier {
    #[must_use]
    pub fn new(n: u64, study_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            identifier: format_accession(n),
            study_id,
        }
    }
}
