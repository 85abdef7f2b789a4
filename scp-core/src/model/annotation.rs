use std::{collections::HashMap, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::number::display_float;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    valuable::Valuable,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationType {
    Group,
    Numeric,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    valuable::Valuable,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationScope {
    Cluster,
    User,
    Study,
}

/// A single entry of a data array or an annotation: coordinates and numeric
/// annotations are numbers, cell names and group labels are text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Numeric(f64),
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Numeric(_) => None,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => f.write_str(&display_float(*n)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("annotation selector '{0}' must have the form name--type--scope")]
    Malformed(String),
    #[error("unknown annotation type '{0}'")]
    Type(String),
    #[error("unknown annotation scope '{0}'")]
    Scope(String),
}

/// The `name--type--scope` string clients pass to pick an annotation. For
/// user annotations the name position carries the annotation's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSelector {
    pub name: String,
    pub annotation_type: AnnotationType,
    pub scope: AnnotationScope,
}

impl AnnotationSelector {
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}--{}--{}", self.name, self.annotation_type, self.scope)
    }
}

impl FromStr for AnnotationSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("--").collect();
        let [name, annotation_type, scope] = parts.as_slice() else {
            return Err(SelectorError::Malformed(s.to_string()));
        };

        if name.is_empty() {
            return Err(SelectorError::Malformed(s.to_string()));
        }

        let annotation_type = annotation_type
            .parse()
            .map_err(|_| SelectorError::Type((*annotation_type).to_string()))?;
        let scope = scope
            .parse()
            .map_err(|_| SelectorError::Scope((*scope).to_string()))?;

        Ok(Self {
            name: (*name).to_string(),
            annotation_type,
            scope,
        })
    }
}

/// An annotation resolved against a study: the display name, and for group
/// annotations the ordered list of labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedAnnotation {
    pub name: String,
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    pub scope: AnnotationScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub values: Vec<String>,
}

impl SelectedAnnotation {
    /// Key used to find subsampled data arrays for this annotation.
    #[must_use]
    pub fn subsample_key(&self) -> String {
        match (self.scope, self.id) {
            (AnnotationScope::User, Some(id)) => format!("{id}--group--user"),
            _ => format!("{}--{}--{}", self.name, self.annotation_type, self.scope),
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.annotation_type == AnnotationType::Numeric
    }
}

/// Where annotation values come from. Cluster and user annotations are
/// stored as arrays aligned with the cell array; study-wide metadata is a
/// lookup by cell name.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationSource {
    Aligned(Vec<CellValue>),
    ByCell(HashMap<String, CellValue>),
}

impl AnnotationSource {
    #[must_use]
    pub fn value_for(&self, index: usize, cell: &str) -> Option<&CellValue> {
        match self {
            Self::Aligned(values) => values.get(index),
            Self::ByCell(values) => values.get(cell),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Cluster--group--cluster", "Cluster", AnnotationType::Group, AnnotationScope::Cluster)]
    #[case("Age--numeric--study", "Age", AnnotationType::Numeric, AnnotationScope::Study)]
    fn parses_selectors(
        #[case] raw: &str,
        #[case] name: &str,
        #[case] annotation_type: AnnotationType,
        #[case] scope: AnnotationScope,
    ) {
        let selector: AnnotationSelector = raw.parse().unwrap();

        assert_eq!(selector.name, name);
        assert_eq!(selector.annotation_type, annotation_type);
        assert_eq!(selector.scope, scope);
        assert_eq!(selector.identifier(), raw);
    }

    #[rstest]
    #[case("Cluster--group")]
    #[case("--group--cluster")]
    #[case("a--b--c--d")]
    fn rejects_malformed_selectors(#[case] raw: &str) {
        assert_eq!(
            raw.parse::<AnnotationSelector>(),
            Err(SelectorError::Malformed(raw.to_string()))
        );
    }

    #[test]
    fn rejects_unknown_scope() {
        assert_eq!(
            "Cluster--group--galaxy".parse::<AnnotationSelector>(),
            Err(SelectorError::Scope("galaxy".to_string()))
        );
    }

    #[test]
    fn cell_values_deserialize_untagged() {
        let values: Vec<CellValue> = serde_json::from_str(r#"[1.5, "A", 2]"#).unwrap();

        assert_eq!(
            values,
            vec![
                CellValue::Numeric(1.5),
                CellValue::Text("A".to_string()),
                CellValue::Numeric(2.0)
            ]
        );
        assert_eq!(values[2].to_string(), "2.0");
    }
}
