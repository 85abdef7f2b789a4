use bson::doc;
use scp_core::model::accession::{StudyAccession, StudyIdentifier};
use uuid::Uuid;

use crate::db::{Store, Stored, error};

const COUNTERS: &str = "counters";

impl Stored for StudyAccession {
    const COLLECTION: &'static str = "study_accessions";
    const UNIQUE: &'static [&'static str] = &["id", "accession", "study_id"];

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Stored for StudyIdentifier {
    const COLLECTION: &'static str = "study_identifiers";
    const UNIQUE: &'static [&'static str] = &["id", "identifier", "study_id"];

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Draws the next value of a named, never-decreasing counter. The first value is 1.
pub async fn next_counter(name: &str, store: &Store) -> error::Result<u64> {
    let n = store.increment(COUNTERS, doc! { "name": name }, "seq", 1).await?;

    u64::try_from(n).map_err(error::Error::from_other_error)
}
