use serde::Serialize;

use super::{DEFAULT_COLORSCALE, PlotStyle, TraceMap, expression::Expression};
use crate::{
    model::annotation::{AnnotationSource, CellValue, SelectedAnnotation},
    number::display_float,
};

/// Key of the single trace used for numeric annotations and expression plots.
pub const ALL_TRACE: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBar {
    pub title: String,
    pub titleside: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerLine {
    pub color: &'static str,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Marker {
    pub size: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// `None` entries render as cells without a color value.
    pub color: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showscale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorbar: Option<ColorBar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<MarkerLine>,
}

impl Marker {
    fn continuous(colors: Vec<Option<f64>>, colorscale: &str, title: &str, line: MarkerLine, style: &PlotStyle) -> Self {
        let (cmin, cmax) = min_max(&colors);

        Self {
            size: vec![style.point_size; colors.len()],
            color: Some(colors),
            cmin,
            cmax,
            colorscale: Some(colorscale.to_string()),
            showscale: Some(true),
            colorbar: Some(ColorBar {
                title: title.to_string(),
                titleside: "right",
            }),
            line: Some(line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScatterTrace {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<f64>>,
    pub cells: Vec<String>,
    pub text: Vec<String>,
    pub annotations: Vec<String>,
    pub name: String,
    pub marker: Marker,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BoxTrace {
    pub y: Vec<f64>,
    pub cells: Vec<String>,
    pub annotations: Vec<String>,
    pub name: String,
}

/// Coordinates and cell names of a cluster (or user annotation) plus the
/// values of the selected annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct PointData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Option<Vec<f64>>,
    pub cells: Vec<String>,
    pub annotations: AnnotationSource,
}

impl PointData {
    fn annotation_value(&self, index: usize) -> Option<&CellValue> {
        let cell = self.cells.get(index)?;
        self.annotations.value_for(index, cell)
    }

    fn z_at(&self, index: usize) -> Option<f64> {
        self.z.as_ref().and_then(|z| z.get(index)).copied()
    }

    fn coordinate(values: &[f64], index: usize) -> f64 {
        values.get(index).copied().unwrap_or_default()
    }
}

fn min_max(values: &[Option<f64>]) -> (Option<f64>, Option<f64>) {
    values.iter().flatten().fold((None, None), |(lo, hi), &v| {
        (
            Some(lo.map_or(v, |lo: f64| lo.min(v))),
            Some(hi.map_or(v, |hi: f64| hi.max(v))),
        )
    })
}

fn value_text(value: Option<&CellValue>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

/// Traces for the cluster tab. A numeric annotation gives a single `all`
/// trace colored by value; a group annotation gives one trace per label.
#[must_use]
pub fn cluster_traces(
    points: &PointData,
    annotation: &SelectedAnnotation,
    style: &PlotStyle,
    colorscale: Option<&str>,
) -> TraceMap<ScatterTrace> {
    if annotation.is_numeric() {
        numeric_cluster_trace(points, annotation, style, colorscale.unwrap_or(DEFAULT_COLORSCALE))
    } else {
        group_cluster_traces(points, annotation, style)
    }
}

fn numeric_cluster_trace(
    points: &PointData,
    annotation: &SelectedAnnotation,
    style: &PlotStyle,
    colorscale: &str,
) -> TraceMap<ScatterTrace> {
    let mut trace = ScatterTrace {
        z: points.z.as_ref().map(|_| Vec::new()),
        name: annotation.name.clone(),
        ..Default::default()
    };
    let mut colors = Vec::new();

    for (index, cell) in points.cells.iter().enumerate() {
        let value = points.annotation_value(index);
        let text = value_text(value);

        trace.x.push(PointData::coordinate(&points.x, index));
        trace.y.push(PointData::coordinate(&points.y, index));
        if let (Some(z), Some(zv)) = (trace.z.as_mut(), points.z_at(index)) {
            z.push(zv);
        }
        trace.cells.push(cell.clone());
        trace.text.push(format!("{cell}: ({text})"));
        trace.annotations.push(text);
        colors.push(value.and_then(CellValue::as_f64));
    }

    let line = MarkerLine {
        color: "rgb(40,40,40)",
        width: style.border_width(),
    };
    trace.marker = Marker::continuous(colors, colorscale, &annotation.name, line, style);

    let mut traces = TraceMap::new();
    traces.insert(ALL_TRACE, trace);

    traces
}

fn group_cluster_traces(
    points: &PointData,
    annotation: &SelectedAnnotation,
    style: &PlotStyle,
) -> TraceMap<ScatterTrace> {
    let name = &annotation.name;
    let new_trace = |value: &str| ScatterTrace {
        z: points.z.as_ref().map(|_| Vec::new()),
        name: format!("{name}: {value}"),
        ..Default::default()
    };

    let mut traces = TraceMap::new();
    for value in &annotation.values {
        traces.insert(value, new_trace(value));
    }

    for (index, cell) in points.cells.iter().enumerate() {
        let Some(value) = points.annotation_value(index) else {
            continue;
        };
        let value = value.to_string();

        let trace = traces.entry(&value, || new_trace(&value));
        trace.x.push(PointData::coordinate(&points.x, index));
        trace.y.push(PointData::coordinate(&points.y, index));
        if let (Some(z), Some(zv)) = (trace.z.as_mut(), points.z_at(index)) {
            z.push(zv);
        }
        trace.cells.push(cell.clone());
        trace.text.push(format!("<b>{cell}</b><br>{name}: {value}"));
        trace.annotations.push(format!("{name}: {value}"));
        trace.marker.size.push(style.point_size);
    }

    traces.retain(|t| !t.x.is_empty());
    for trace in traces.values_mut() {
        let points = trace.x.len();
        trace.name.push_str(&format!(" ({points} points)"));
    }

    traces
}

/// The cluster colored by expression, as a single `all` trace.
#[must_use]
pub fn expression_scatter(
    points: &PointData,
    annotation: &SelectedAnnotation,
    expression: &Expression<'_>,
    style: &PlotStyle,
) -> TraceMap<ScatterTrace> {
    let label = expression.axis_title(&style.expression_label);
    let name = &annotation.name;

    let mut trace = ScatterTrace {
        x: points.x.clone(),
        y: points.y.clone(),
        z: points.z.clone(),
        cells: points.cells.clone(),
        name: ALL_TRACE.to_string(),
        ..Default::default()
    };
    let mut colors = Vec::with_capacity(points.cells.len());

    for (index, cell) in points.cells.iter().enumerate() {
        let score = expression.score(cell);
        let value = value_text(points.annotation_value(index));

        trace.text.push(format!(
            "{cell} ({name}: {value})<br />{label}: {}",
            display_float(score)
        ));
        trace.annotations.push(format!("{name}: {value}"));
        colors.push(Some(score));
    }

    let line = MarkerLine {
        color: expression.border_color(),
        width: style.border_width(),
    };
    trace.marker = Marker::continuous(colors, DEFAULT_COLORSCALE, &label, line, style);

    let mut traces = TraceMap::new();
    traces.insert(ALL_TRACE, trace);

    traces
}

/// Expression distributions per annotation label, for box and violin plots.
/// Cells whose label is not one of the annotation's values are skipped.
#[must_use]
pub fn expression_boxplots(
    cells: &[String],
    annotations: &AnnotationSource,
    annotation: &SelectedAnnotation,
    expression: &Expression<'_>,
) -> TraceMap<BoxTrace> {
    let mut traces = TraceMap::new();
    for value in &annotation.values {
        traces.insert(
            value,
            BoxTrace {
                name: value.clone(),
                ..Default::default()
            },
        );
    }

    for (index, cell) in cells.iter().enumerate() {
        let Some(value) = annotations.value_for(index, cell) else {
            continue;
        };
        let value = value.to_string();
        let Some(trace) = traces.get_mut(&value) else {
            continue;
        };

        trace.y.push(expression.score(cell));
        trace.cells.push(cell.clone());
        trace.annotations.push(value);
    }

    traces.retain(|t| !t.y.is_empty());

    traces
}

/// A numeric annotation on x against expression on y.
#[must_use]
pub fn annotation_scatter(
    cells: &[String],
    annotations: &AnnotationSource,
    annotation: &SelectedAnnotation,
    expression: &Expression<'_>,
    style: &PlotStyle,
) -> TraceMap<ScatterTrace> {
    let label = expression.axis_title(&style.expression_label);
    let name = &annotation.name;

    let mut trace = ScatterTrace {
        name: ALL_TRACE.to_string(),
        ..Default::default()
    };

    for (index, cell) in cells.iter().enumerate() {
        let Some(value) = annotations.value_for(index, cell) else {
            continue;
        };
        let Some(x) = value.as_f64() else {
            continue;
        };
        let score = expression.score(cell);

        trace.text.push(format!(
            "<b>{cell}</b><br>{name}: {value}<br>{label}: {}",
            display_float(score)
        ));
        trace.annotations.push(format!("{name}: {value}"));
        trace.x.push(x);
        trace.y.push(score);
        trace.cells.push(cell.clone());
        trace.marker.size.push(style.point_size);
    }

    let mut traces = TraceMap::new();
    traces.insert(ALL_TRACE, trace);

    traces
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use uuid::Uuid;

    use super::*;
    use crate::model::{
        annotation::{AnnotationScope, AnnotationType},
        expression::{Consensus, ExpressionScore},
    };

    fn selected(name: &str, annotation_type: AnnotationType, values: &[&str]) -> SelectedAnnotation {
        SelectedAnnotation {
            name: name.to_string(),
            annotation_type,
            scope: AnnotationScope::Cluster,
            id: None,
            values: values.iter().map(ToString::to_string).collect(),
        }
    }

    #[fixture]
    fn points() -> PointData {
        PointData {
            x: vec![1.0, 2.0, 3.0, 4.0],
            y: vec![5.0, 6.0, 7.0, 8.0],
            z: None,
            cells: ["c1", "c2", "c3", "c4"].map(String::from).to_vec(),
            annotations: AnnotationSource::Aligned(vec!["A".into(), "B".into(), "A".into(), "A".into()]),
        }
    }

    fn gene() -> ExpressionScore {
        ExpressionScore::new(
            Uuid::nil(),
            Uuid::nil(),
            "Sox2",
            HashMap::from([("c1".to_string(), 1.5), ("c3".to_string(), 0.25)]),
        )
    }

    #[rstest]
    fn group_traces_count_points(points: PointData) {
        let annotation = selected("Cluster", AnnotationType::Group, &["A", "B", "C"]);

        let traces = cluster_traces(&points, &annotation, &PlotStyle::default(), None);

        assert_eq!(traces.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        let a = traces.get("A").unwrap();
        assert_eq!(a.name, "Cluster: A (3 points)");
        assert_eq!(a.text[0], "<b>c1</b><br>Cluster: A");
        assert_eq!(a.x, vec![1.0, 3.0, 4.0]);
        assert_eq!(a.z, None);
        assert_eq!(traces.get("B").unwrap().name, "Cluster: B (1 points)");

        let total: usize = traces.values().map(|t| t.x.len()).sum();
        assert_eq!(total, points.cells.len());
    }

    #[rstest]
    fn numeric_trace_spans_values(mut points: PointData) {
        points.annotations = AnnotationSource::Aligned(vec![0.5.into(), 3.0.into(), (-1.0).into(), 2.0.into()]);
        let annotation = selected("Age", AnnotationType::Numeric, &[]);

        let traces = cluster_traces(&points, &annotation, &PlotStyle::default(), Some("Viridis"));

        assert_eq!(traces.len(), 1);
        let all = traces.get(ALL_TRACE).unwrap();
        assert_eq!(all.marker.cmin, Some(-1.0));
        assert_eq!(all.marker.cmax, Some(3.0));
        assert_eq!(all.marker.colorscale.as_deref(), Some("Viridis"));
        assert_eq!(all.text[1], "c2: (3.0)");
    }

    #[rstest]
    fn numeric_trace_keeps_cells_without_values(mut points: PointData) {
        points.annotations = AnnotationSource::ByCell(HashMap::from([
            ("c1".to_string(), CellValue::from(2.0)),
            ("c3".to_string(), CellValue::from(4.0)),
        ]));
        let annotation = selected("Age", AnnotationType::Numeric, &[]);

        let traces = cluster_traces(&points, &annotation, &PlotStyle::default(), None);

        let all = traces.get(ALL_TRACE).unwrap();
        assert_eq!(all.x.len(), points.cells.len());
        assert_eq!(all.marker.color, Some(vec![Some(2.0), None, Some(4.0), None]));
        assert_eq!(all.text[1], "c2: ()");
        assert_eq!(all.marker.cmin, Some(2.0));
    }

    #[rstest]
    fn study_scope_skips_cells_without_values(mut points: PointData) {
        points.annotations = AnnotationSource::ByCell(HashMap::from([
            ("c2".to_string(), CellValue::from("B")),
            ("c4".to_string(), CellValue::from("B")),
        ]));
        let annotation = selected("Species", AnnotationType::Group, &["B"]);

        let traces = cluster_traces(&points, &annotation, &PlotStyle::default(), None);

        assert_eq!(traces.get("B").unwrap().cells, vec!["c2".to_string(), "c4".to_string()]);
    }

    #[rstest]
    fn expression_scatter_text(points: PointData) {
        let gene = gene();
        let annotation = selected("Cluster", AnnotationType::Group, &["A", "B"]);
        let style = PlotStyle {
            show_borders: false,
            ..PlotStyle::default()
        };

        let traces = expression_scatter(&points, &annotation, &Expression::Gene(&gene), &style);

        let all = traces.get(ALL_TRACE).unwrap();
        assert_eq!(all.text[0], "c1 (Cluster: A)<br />Expression: 1.5");
        assert_eq!(all.text[1], "c2 (Cluster: B)<br />Expression: 0.0");
        assert_eq!(all.marker.cmax, Some(1.5));
        assert_eq!(all.marker.cmin, Some(0.0));
        assert_eq!(
            all.marker.line,
            Some(MarkerLine {
                color: "rgb(255,255,255)",
                width: 0.0
            })
        );
    }

    #[rstest]
    fn boxplots_by_label(points: PointData) {
        let genes = [gene(), gene()];
        let annotation = selected("Cluster", AnnotationType::Group, &["A", "B", "C"]);
        let expression = Expression::Consensus {
            genes: &genes,
            method: Consensus::Mean,
        };

        let traces = expression_boxplots(&points.cells, &points.annotations, &annotation, &expression);

        assert_eq!(traces.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(traces.get("A").unwrap().y, vec![1.5, 0.25, 0.0]);
    }

    #[rstest]
    fn annotation_scatter_uses_numeric_values(points: PointData) {
        let gene = gene();
        let annotations = AnnotationSource::Aligned(vec![10.0.into(), "n/a".into(), 30.0.into(), 40.0.into()]);
        let annotation = selected("Age", AnnotationType::Numeric, &[]);

        let traces = annotation_scatter(
            &points.cells,
            &annotations,
            &annotation,
            &Expression::Gene(&gene),
            &PlotStyle::default(),
        );

        let all = traces.get(ALL_TRACE).unwrap();
        assert_eq!(all.x, vec![10.0, 30.0, 40.0]);
        assert_eq!(all.y, vec![1.5, 0.25, 0.0]);
        assert_eq!(all.text[0], "<b>c1</b><br>Age: 10.0<br>Expression: 1.5");
    }
}
