use std::collections::HashMap;

use serde::Serialize;

use crate::{
    model::{
        annotation::{AnnotationSource, SelectedAnnotation},
        expression::ExpressionScore,
    },
    stats::mean,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dot {
    pub annotation: String,
    pub mean: f64,
    /// Share of the group's cells with expression above zero, from 0 to 100.
    pub percent: f64,
    pub cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DotRow {
    pub gene: String,
    pub dots: Vec<Dot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DotPlot {
    pub annotation: String,
    pub values: Vec<String>,
    pub rows: Vec<DotRow>,
}

/// Collapses each gene's scores over the cells of every annotation label.
#[must_use]
pub fn dot_plot(
    genes: &[ExpressionScore],
    cells: &[String],
    annotations: &AnnotationSource,
    annotation: &SelectedAnnotation,
) -> DotPlot {
    let mut members_of: HashMap<String, Vec<&str>> = HashMap::new();
    for (index, cell) in cells.iter().enumerate() {
        if let Some(value) = annotations.value_for(index, cell) {
            members_of.entry(value.to_string()).or_default().push(cell.as_str());
        }
    }

    let groups: Vec<(String, Vec<&str>)> = annotation
        .values
        .iter()
        .filter_map(|value| members_of.remove(value).map(|members| (value.clone(), members)))
        .collect();

    let rows = genes
        .iter()
        .map(|gene| DotRow {
            gene: gene.gene.clone(),
            dots: groups
                .iter()
                .map(|(value, members)| {
                    let scores: Vec<f64> = members.iter().map(|c| gene.score(c)).collect();
                    let expressing = scores.iter().filter(|s| **s > 0.0).count();

                    #[allow(clippy::cast_precision_loss)]
                    let percent = expressing as f64 / scores.len() as f64 * 100.0;

                    Dot {
                        annotation: value.clone(),
                        mean: mean(&scores),
                        percent,
                        cells: scores.len(),
                    }
                })
                .collect(),
        })
        .collect();

    DotPlot {
        annotation: annotation.name.clone(),
        values: groups.into_iter().map(|(value, _)| value).collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::model::annotation::{AnnotationScope, AnnotationType};

    #[test]
    fn mean_and_percent_expressing() {
        let gene = ExpressionScore::new(
            Uuid::nil(),
            Uuid::nil(),
            "Gad1",
            HashMap::from([("c1".to_string(), 2.0), ("c2".to_string(), 0.0), ("c3".to_string(), 4.0)]),
        );
        let cells: Vec<String> = ["c1", "c2", "c3", "c4"].map(String::from).to_vec();
        let annotations = AnnotationSource::Aligned(vec!["A".into(), "A".into(), "B".into(), "B".into()]);
        let annotation = SelectedAnnotation {
            name: "Cluster".to_string(),
            annotation_type: AnnotationType::Group,
            scope: AnnotationScope::Cluster,
            id: None,
            values: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        };

        let plot = dot_plot(&[gene], &cells, &annotations, &annotation);

        assert_eq!(plot.values, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            plot.rows[0].dots,
            vec![
                Dot {
                    annotation: "A".to_string(),
                    mean: 1.0,
                    percent: 50.0,
                    cells: 2
                },
                Dot {
                    annotation: "B".to_string(),
                    mean: 2.0,
                    percent: 50.0,
                    cells: 2
                }
            ]
        );
    }
}
