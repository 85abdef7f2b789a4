use bson::doc;
use itertools::Itertools;
use scp_core::model::expression::{ExpressionScore, PrecomputedScore, best_match};
use uuid::Uuid;

use crate::db::{Store, Stored, by_study, error, uuid_filter};

impl Stored for ExpressionScore {
    const COLLECTION: &'static str = "expression_scores";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Stored for PrecomputedScore {
    const COLLECTION: &'static str = "precomputed_scores";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Looks a gene up by exact symbol and falls back to a case-insensitive match.
pub async fn fetch_gene(study_id: &Uuid, term: &str, store: &Store) -> error::Result<Option<ExpressionScore>> {
    let exact: Vec<ExpressionScore> = store
        .find(doc! { "study_id": uuid_filter(study_id), "gene": term })
        .await?;

    let candidates = if exact.is_empty() {
        store
            .find(doc! { "study_id": uuid_filter(study_id), "searchable_gene": term.to_lowercase() })
            .await?
    } else {
        exact
    };

    Ok(best_match(candidates, term))
}

/// Found genes in query order, without repeats, and the terms that matched nothing.
pub async fn fetch_genes(
    study_id: &Uuid,
    terms: &[String],
    store: &Store,
) -> error::Result<(Vec<ExpressionScore>, Vec<String>)> {
    let mut found: Vec<ExpressionScore> = Vec::new();
    let mut not_found = Vec::new();

    for term in terms.iter().unique() {
        match fetch_gene(study_id, term, store).await? {
            Some(gene) if !found.iter().any(|g| g.id == gene.id) => found.push(gene),
            Some(_) => {}
            None => not_found.push(term.clone()),
        }
    }

    Ok((found, not_found))
}

pub async fn fetch_gene_names(study_id: &Uuid, store: &Store) -> error::Result<Vec<String>> {
    let genes: Vec<ExpressionScore> = store.find(by_study(study_id)).await?;

    Ok(genes.into_iter().map(|g| g.gene).unique().sorted().collect())
}

pub async fn fetch_precomputed_scores(study_id: &Uuid, store: &Store) -> error::Result<Vec<PrecomputedScore>> {
    store.find(by_study(study_id)).await
}

pub async fn fetch_precomputed_score(study_id: &Uuid, name: &str, store: &Store) -> error::Result<PrecomputedScore> {
    store
        .fetch(doc! { "study_id": uuid_filter(study_id), "name": name })
        .await
}
