use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Expression scores of one gene, keyed by cell name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScore {
    pub id: Uuid,
    pub study_id: Uuid,
    pub study_file_id: Uuid,
    pub gene: String,
    pub searchable_gene: String,
    #[serde(default)]
    pub scores: HashMap<String, f64>,
}

impl ExpressionScore {
    #[must_use]
    pub fn new(study_id: Uuid, study_file_id: Uuid, gene: &str, scores: HashMap<String, f64>) -> Self {
        Self {
            id: Uuid::now_v7(),
            study_id,
            study_file_id,
            gene: gene.to_string(),
            searchable_gene: gene.to_lowercase(),
            scores,
        }
    }

    #[must_use]
    pub fn score(&self, cell: &str) -> f64 {
        self.scores.get(cell).copied().unwrap_or_default()
    }

    /// Whether this row is a candidate for `term`, exactly or ignoring case.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        self.gene == term || self.searchable_gene == term.to_lowercase()
    }
}

/// Picks an exact match first, then a case-insensitive one.
#[must_use]
pub fn best_match(matches: Vec<ExpressionScore>, term: &str) -> Option<ExpressionScore> {
    let lowered = term.to_lowercase();

    let exact = matches.iter().position(|m| m.gene == term);
    let index = exact.or_else(|| matches.iter().position(|m| m.searchable_gene == lowered))?;

    matches.into_iter().nth(index)
}

/// Splits a free-text gene query on whitespace and commas.
#[must_use]
pub fn parse_search_terms(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct GeneSearch {
    pub genes: Vec<String>,
    pub not_found: Vec<String>,
}

/// Sorts `terms` into those the study knows about and those it does not,
/// preserving query order. Only names are compared; no scores are loaded.
#[must_use]
pub fn search_genes(known_genes: &[String], terms: &[String]) -> GeneSearch {
    let searchable: Vec<String> = known_genes.iter().map(|g| g.to_lowercase()).collect();

    let (genes, not_found) = terms.iter().cloned().partition(|term| {
        known_genes.contains(term) || searchable.contains(&term.to_lowercase())
    });

    GeneSearch { genes, not_found }
}

pub const HEADER_GENES: usize = 5;

/// Splits a gene list into the genes shown in a page header and the overflow.
#[must_use]
pub fn divide_genes_for_header<T: Clone>(genes: &[T]) -> (Vec<T>, Vec<T>) {
    let split = genes.len().min(HEADER_GENES);
    let (main, more) = genes.split_at(split);

    (main.to_vec(), more.to_vec())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneScoreRow {
    pub gene: String,
    pub scores: HashMap<String, f64>,
}

/// A study-supplied marker gene list with a score per cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedScore {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    pub clusters: Vec<String>,
    pub gene_scores: Vec<GeneScoreRow>,
}

impl PrecomputedScore {
    #[must_use]
    pub fn gene_list(&self) -> Vec<String> {
        self.gene_scores.iter().map(|row| row.gene.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Consensus {
    #[default]
    Mean,
    Median,
}

impl Consensus {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mean => "Mean",
            Self::Median => "Median",
        }
    }

    #[must_use]
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => crate::stats::mean(values),
            Self::Median => crate::stats::median(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn score(gene: &str) -> ExpressionScore {
        ExpressionScore::new(Uuid::nil(), Uuid::nil(), gene, HashMap::new())
    }

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let matches = vec![score("gad1"), score("Gad1")];

        assert_eq!(best_match(matches.clone(), "Gad1").unwrap().gene, "Gad1");
        assert_eq!(best_match(matches, "GAD1").unwrap().gene, "gad1");
        assert!(best_match(vec![score("Sox2")], "Gad1").is_none());
    }

    #[test]
    fn search_terms_split_on_commas_and_whitespace() {
        assert_eq!(
            parse_search_terms("Gad1, Sox2\nPax6  Tbr1"),
            vec!["Gad1", "Sox2", "Pax6", "Tbr1"]
        );
    }

    #[test]
    fn gene_search_preserves_order() {
        let known = vec!["Gad1".to_string(), "Sox2".to_string()];
        let terms = parse_search_terms("sox2 Foo Gad1");

        assert_eq!(
            search_genes(&known, &terms),
            GeneSearch {
                genes: vec!["sox2".to_string(), "Gad1".to_string()],
                not_found: vec!["Foo".to_string()],
            }
        );
    }

    #[test]
    fn header_split() {
        let genes: Vec<u8> = (0..7).collect();
        let (main, more) = divide_genes_for_header(&genes);

        assert_eq!(main, vec![0, 1, 2, 3, 4]);
        assert_eq!(more, vec![5, 6]);
    }

    #[test]
    fn consensus_parses_case_insensitively() {
        assert_eq!("Median".parse::<Consensus>(), Ok(Consensus::Median));
        assert_eq!(Consensus::default().apply(&[1.0, 2.0, 6.0]), 3.0);
        assert_eq!(Consensus::Median.apply(&[1.0, 2.0, 6.0]), 2.0);
    }
}
