use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::annotation::AnnotationType;
use crate::plot::range::DomainRanges;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterType {
    #[default]
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellAnnotation {
    pub name: String,
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGroup {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub cluster_type: ClusterType,
    #[serde(default)]
    pub cell_annotations: Vec<CellAnnotation>,
    #[serde(default)]
    pub domain_ranges: Option<DomainRanges>,
    #[serde(default)]
    pub x_axis_label: Option<String>,
    #[serde(default)]
    pub y_axis_label: Option<String>,
    #[serde(default)]
    pub z_axis_label: Option<String>,
    #[serde(default)]
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisLabels {
    pub x: String,
    pub y: String,
    pub z: String,
}

fn label_or(label: Option<&String>, default: &str) -> String {
    match label {
        Some(l) if !l.trim().is_empty() => l.clone(),
        _ => default.to_string(),
    }
}

impl ClusterGroup {
    #[must_use]
    pub fn is_3d(&self) -> bool {
        self.cluster_type == ClusterType::ThreeD
    }

    #[must_use]
    pub fn has_range(&self) -> bool {
        self.domain_ranges.is_some()
    }

    #[must_use]
    pub fn cell_annotation(&self, name: &str, annotation_type: AnnotationType) -> Option<&CellAnnotation> {
        self.cell_annotations
            .iter()
            .find(|a| a.name == name && a.annotation_type == annotation_type)
    }

    #[must_use]
    pub fn axis_labels(&self) -> AxisLabels {
        AxisLabels {
            x: label_or(self.x_axis_label.as_ref(), "X"),
            y: label_or(self.y_axis_label.as_ref(), "Y"),
            z: label_or(self.z_axis_label.as_ref(), "Z"),
        }
    }

    #[must_use]
    pub fn plot_type(&self) -> &'static str {
        if self.is_3d() { "scatter3d" } else { "scattergl" }
    }
}
