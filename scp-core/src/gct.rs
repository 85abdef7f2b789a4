//! Text exports read by the heatmap client: GCT 1.2 matrices and two-column
//! annotation tables.

use itertools::Itertools;
use serde::Deserialize;

use crate::{
    model::{
        annotation::CellValue,
        expression::{ExpressionScore, PrecomputedScore},
    },
    number::display_float,
    stats,
};

const GCT_VERSION: &str = "#1.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::EnumString, valuable::Valuable)]
pub enum RowCentering {
    #[default]
    #[serde(rename = "", alias = "none")]
    #[strum(serialize = "", serialize = "none")]
    None,
    #[serde(rename = "z-score")]
    #[strum(serialize = "z-score")]
    ZScore,
    #[serde(rename = "robust-z-score")]
    #[strum(serialize = "robust-z-score")]
    RobustZScore,
}

fn gct(rows: &[String], columns: &[String]) -> String {
    let header = ["Name", "Description"]
        .into_iter()
        .chain(columns.iter().map(String::as_str))
        .join("\t");

    [
        GCT_VERSION.to_string(),
        format!("{}\t{}", rows.len(), columns.len()),
        header,
        rows.join("\n"),
    ]
    .join("\n")
}

fn row(gene: &str, values: impl IntoIterator<Item = f64>) -> String {
    [gene.to_string(), String::new()]
        .into_iter()
        .chain(values.into_iter().map(display_float))
        .join("\t")
}

/// Expression of `genes` over `cells`, one row per gene, in query order.
#[must_use]
pub fn expression_gct(genes: &[ExpressionScore], cells: &[String], centering: RowCentering) -> String {
    let rows: Vec<String> = genes
        .iter()
        .map(|gene| {
            let values: Vec<f64> = match centering {
                RowCentering::None => cells.iter().map(|c| gene.score(c)).collect(),
                RowCentering::ZScore => stats::z_score(&gene.scores, cells),
                RowCentering::RobustZScore => stats::robust_z_score(&gene.scores, cells),
            };
            row(&gene.gene, values)
        })
        .collect();

    gct(&rows, cells)
}

/// Precomputed marker scores with the precomputed clusters as columns. Centering
/// subtracts the mean of every score in the row.
#[must_use]
pub fn precomputed_gct(score: &PrecomputedScore, row_centered: bool) -> String {
    let rows: Vec<String> = score
        .gene_scores
        .iter()
        .map(|gene_row| {
            let offset = if row_centered {
                let all: Vec<f64> = gene_row.scores.values().copied().collect();
                stats::mean(&all)
            } else {
                0.0
            };

            let values = score
                .clusters
                .iter()
                .map(|cluster| gene_row.scores.get(cluster).copied().unwrap_or_default() - offset);
            row(&gene_row.gene, values)
        })
        .collect();

    gct(&rows, &score.clusters)
}

/// `NAME\t{annotation}` followed by one `cell\tvalue` line per cell. Cells
/// without a value get an empty second column.
#[must_use]
pub fn annotation_tsv(annotation: &str, cells: &[String], values: &[Option<CellValue>]) -> String {
    let rows = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let value = values
                .get(index)
                .and_then(Option::as_ref)
                .map(ToString::to_string)
                .unwrap_or_default();
            format!("{cell}\t{value}")
        })
        .join("\n");

    [format!("NAME\t{annotation}"), rows].join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;
    use crate::model::expression::GeneScoreRow;

    fn cells() -> Vec<String> {
        ["c1", "c2", "c3"].map(String::from).to_vec()
    }

    fn gene(name: &str, scores: &[(&str, f64)]) -> ExpressionScore {
        let scores = scores.iter().map(|(c, s)| ((*c).to_string(), *s)).collect();
        ExpressionScore::new(Uuid::nil(), Uuid::nil(), name, scores)
    }

    #[test]
    fn expression_matrix() {
        let genes = [
            gene("Sox2", &[("c1", 1.5), ("c3", 0.00001)]),
            gene("Gad1", &[("c2", 2.0)]),
        ];

        let expected = "#1.2\n2\t3\nName\tDescription\tc1\tc2\tc3\nSox2\t\t1.5\t0.0\t1.0e-05\nGad1\t\t0.0\t2.0\t0.0";

        assert_eq!(expression_gct(&genes, &cells(), RowCentering::None), expected);
    }

    #[test]
    fn z_scored_rows() {
        let genes = [gene("Sox2", &[("c1", 1.0), ("c2", 2.0), ("c3", 3.0)])];

        let gct = expression_gct(&genes, &cells(), RowCentering::ZScore);
        let values: Vec<f64> = gct
            .lines()
            .last()
            .unwrap()
            .split('\t')
            .skip(2)
            .map(|v| v.parse().unwrap())
            .collect();

        assert_eq!(values[1], 0.0);
        assert!((values[0] + values[2]).abs() < 1e-12);
        assert!(values[2] > 1.0);
    }

    #[rstest]
    #[case("", RowCentering::None)]
    #[case("z-score", RowCentering::ZScore)]
    #[case("robust-z-score", RowCentering::RobustZScore)]
    fn parses_centering(#[case] raw: &str, #[case] expected: RowCentering) {
        assert_eq!(raw.parse::<RowCentering>().unwrap(), expected);
    }

    #[test]
    fn empty_query_keeps_header() {
        assert_eq!(
            expression_gct(&[], &cells(), RowCentering::None),
            "#1.2\n0\t3\nName\tDescription\tc1\tc2\tc3\n"
        );
    }

    #[test]
    fn precomputed_centering() {
        let score = PrecomputedScore {
            id: Uuid::nil(),
            study_id: Uuid::nil(),
            name: "markers".to_string(),
            clusters: vec!["A".to_string(), "B".to_string()],
            gene_scores: vec![GeneScoreRow {
                gene: "Sox2".to_string(),
                scores: HashMap::from([("A".to_string(), 1.0), ("B".to_string(), 3.0)]),
            }],
        };

        assert_eq!(
            precomputed_gct(&score, false),
            "#1.2\n1\t2\nName\tDescription\tA\tB\nSox2\t\t1.0\t3.0"
        );
        assert_eq!(
            precomputed_gct(&score, true),
            "#1.2\n1\t2\nName\tDescription\tA\tB\nSox2\t\t-1.0\t1.0"
        );
    }

    #[test]
    fn annotation_table() {
        let values = vec![Some(CellValue::from("A")), None, Some(CellValue::from(2.5))];

        assert_eq!(
            annotation_tsv("Cluster", &cells(), &values),
            "NAME\tCluster\nc1\tA\nc2\t\nc3\t2.5"
        );
    }
}
