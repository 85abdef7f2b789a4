use crate::{
    model::expression::{Consensus, ExpressionScore},
    number::round4,
};

/// What a plot colors cells by: one gene, or a consensus over a gene set.
#[derive(Debug, Clone, Copy)]
pub enum Expression<'a> {
    Gene(&'a ExpressionScore),
    Consensus {
        genes: &'a [ExpressionScore],
        method: Consensus,
    },
}

impl Expression<'_> {
    /// Single-gene scores are rounded to four places; consensus values are not.
    #[must_use]
    pub fn score(&self, cell: &str) -> f64 {
        match self {
            Self::Gene(gene) => round4(gene.score(cell)),
            Self::Consensus { genes, method } => {
                let scores: Vec<f64> = genes.iter().map(|g| g.score(cell)).collect();
                method.apply(&scores)
            }
        }
    }

    pub(super) fn border_color(&self) -> &'static str {
        match self {
            Self::Gene(_) => "rgb(255,255,255)",
            Self::Consensus { .. } => "rgb(40,40,40)",
        }
    }

    #[must_use]
    pub fn axis_title(&self, expression_label: &str) -> String {
        match self {
            Self::Gene(_) => expression_label.to_string(),
            Self::Consensus { method, .. } => format!("{} {expression_label}", method.label()),
        }
    }
}
