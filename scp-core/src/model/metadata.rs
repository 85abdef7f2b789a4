use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::annotation::{AnnotationType, CellValue};

/// A study-wide annotation. Values are looked up by cell name rather than aligned
/// with a cluster's cell array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadatum {
    pub id: Uuid,
    pub study_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    #[serde(default)]
    pub cell_values: HashMap<String, CellValue>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl StudyMetadatum {
    #[must_use]
    pub fn new(
        study_id: Uuid,
        name: &str,
        annotation_type: AnnotationType,
        cell_values: HashMap<String, CellValue>,
    ) -> Self {
        let values = match annotation_type {
            AnnotationType::Group => {
                let mut values: Vec<String> = cell_values.values().map(ToString::to_string).collect();
                values.sort();
                values.dedup();
                values
            }
            AnnotationType::Numeric => Vec::new(),
        };

        Self {
            id: Uuid::now_v7(),
            study_id,
            name: name.to_string(),
            annotation_type,
            cell_values,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn group_values_are_distinct_and_sorted() {
        let cell_values = HashMap::from([
            ("c1".to_string(), CellValue::from("B")),
            ("c2".to_string(), CellValue::from("A")),
            ("c3".to_string(), CellValue::from("B")),
        ]);

        let metadatum = StudyMetadatum::new(Uuid::nil(), "Species", AnnotationType::Group, cell_values);

        assert_eq!(metadatum.values, vec!["A".to_string(), "B".to_string()]);
    }
}
