use bson::{Document, doc};
use chrono::Utc;
use itertools::Itertools;
use scp_core::model::{
    accession::{ACCESSION_COUNTER, IDENTIFIER_COUNTER, StudyAccession, StudyIdentifier},
    study::{NewStudy, Study, Viewer, url_safe_name},
};
use uuid::Uuid;

use crate::db::{Store, Stored, Write, by_id, error};

use super::accession::next_counter;

impl Stored for Study {
    const COLLECTION: &'static str = "studies";
    const UNIQUE: &'static [&'static str] = &["id", "name", "url_safe_name"];

    fn id(&self) -> Uuid {
        self.id
    }
}

pub async fn fetch_study(url_safe_name: &str, store: &Store) -> error::Result<Study> {
    store.fetch(doc! { "url_safe_name": url_safe_name }).await
}

pub async fn fetch_viewable_studies(viewer: Option<&Viewer>, store: &Store) -> error::Result<Vec<Study>> {
    let studies: Vec<Study> = store.find(doc! {}).await?;

    Ok(studies.into_iter().filter(|s| s.can_view(viewer)).collect())
}

/// Bumps the view counter and returns the study as stored afterwards.
pub async fn record_view(study: Study, store: &Store) -> error::Result<Study> {
    let view_count = store.increment(Study::COLLECTION, by_id(&study.id), "view_count", 1).await?;

    Ok(Study {
        view_count: u64::try_from(view_count).unwrap_or_default(),
        ..study
    })
}

/// A new study together with the user creating it.
pub struct StudyCreation {
    pub study: NewStudy,
    pub user_id: Uuid,
}

impl StudyCreation {
    async fn check_unique(&self, store: &Store) -> error::Result<()> {
        let name = &self.study.name;
        let slug = url_safe_name(name);

        let candidates = [("name", name.clone()), ("url_safe_name", slug)];
        for (field, value) in candidates {
            let mut filter = Document::new();
            filter.insert(field, value.as_str());

            let existing: Option<Study> = store.find_one(filter).await?;

            if existing.is_some() {
                return Err(error::Error::DuplicateRecord {
                    entity: Study::COLLECTION.to_string(),
                    field: Some(field.to_string()),
                    value: Some(value),
                });
            }
        }

        Ok(())
    }
}

impl Write for StudyCreation {
    type Returns = Study;

    /// Accession numbers are only drawn once the study is known not to clash, so
    /// they stay contiguous.
    async fn write(self, store: &Store) -> error::Result<Self::Returns> {
        self.check_unique(store).await?;

        let Self { study, user_id } = self;
        let mut study = Study::new(study, user_id, Utc::now());

        let accession = StudyAccession::new(next_counter(ACCESSION_COUNTER, store).await?, study.id);
        let identifier = StudyIdentifier::new(next_counter(IDENTIFIER_COUNTER, store).await?, study.id);
        study.accession = Some(accession.accession.clone());

        store.insert(&study).await?;
        store.insert(&accession).await?;
        store.insert(&identifier).await?;

        tracing::info!(study = %study.url_safe_name, accession = %accession.accession, "created study");

        Ok(study)
    }
}

/// Case-insensitive match on name or description.
#[must_use]
pub fn search_studies(studies: Vec<Study>, terms: &str) -> Vec<Study> {
    let terms = terms.split_whitespace().map(str::to_lowercase).collect_vec();

    if terms.is_empty() {
        return studies;
    }

    studies
        .into_iter()
        .filter(|s| {
            let haystack = format!("{} {}", s.name, s.description).to_lowercase();
            terms.iter().any(|t| haystack.contains(t.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    fn new_study(name: &str) -> NewStudy {
        serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
    }

    #[fixture]
    fn store() -> Store {
        Store::memory()
    }

    #[rstest]
    #[tokio::test]
    async fn accessions_follow_creation_order(store: Store) {
        let mut accessions = Vec::new();

        for name in ["First study", "Second study", "Third study"] {
            let creation = StudyCreation {
                study: new_study(name),
                user_id: Uuid::nil(),
            };
            let study = creation.write(&store).await.unwrap();
            accessions.push(study.accession.unwrap());
        }

        assert_eq!(accessions, ["SCP1", "SCP2", "SCP3"]);

        let stored: Vec<StudyAccession> = store.find(doc! {}).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_name_draws_no_accession(store: Store) {
        let creation = || StudyCreation {
            study: new_study("Same Name"),
            user_id: Uuid::nil(),
        };

        creation().write(&store).await.unwrap();
        let err = creation().write(&store).await.unwrap_err();
        assert!(matches!(err, error::Error::DuplicateRecord { .. }));

        let other = StudyCreation {
            study: new_study("Other"),
            user_id: Uuid::nil(),
        };
        let study = other.write(&store).await.unwrap();
        assert_eq!(study.accession.as_deref(), Some("SCP2"));
    }

    #[rstest]
    #[tokio::test]
    async fn views_are_counted(store: Store) {
        let study = StudyCreation {
            study: new_study("Viewed"),
            user_id: Uuid::nil(),
        }
        .write(&store)
        .await
        .unwrap();

        let study = record_view(study, &store).await.unwrap();
        let study = record_view(study, &store).await.unwrap();
        assert_eq!(study.view_count, 2);

        let stored = fetch_study("viewed", &store).await.unwrap();
        assert_eq!(stored.view_count, 2);
    }
}
