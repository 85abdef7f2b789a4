use std::collections::HashMap;

use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    Endpoint,
    annotation::{AnnotationScope, AnnotationType, CellValue, SelectedAnnotation},
    data_array::{ArrayOwner, ArrayQuery, ArrayType, CELLS_ARRAY, DataArray, LinearDataType},
};

/// Label given to cells that fall outside every selection.
pub const UNDEFINED_LABEL: &str = "Undefined";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnnotation {
    pub id: Uuid,
    pub study_id: Uuid,
    pub user_id: Uuid,
    pub cluster_group_id: Uuid,
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub source_annotation: Option<String>,
}

impl UserAnnotation {
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}--group--user", self.id)
    }

    #[must_use]
    pub fn owner(&self) -> ArrayOwner {
        ArrayOwner {
            study_id: self.study_id,
            linear_data_id: self.id,
            linear_data_type: LinearDataType::UserAnnotation,
        }
    }

    #[must_use]
    pub fn selected(&self) -> SelectedAnnotation {
        SelectedAnnotation {
            name: self.name.clone(),
            annotation_type: AnnotationType::Group,
            scope: AnnotationScope::User,
            id: Some(self.id),
            values: self.values.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Selection {
    #[garde(length(min = 1))]
    pub name: String,
    /// Comma-separated cell names.
    #[garde(length(min = 1))]
    pub values: String,
}

impl Selection {
    fn cells(&self) -> impl Iterator<Item = &str> {
        self.values.split(',').map(str::trim).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(allow_unvalidated)]
pub struct NewUserAnnotation {
    #[garde(length(min = 1))]
    pub name: String,
    pub cluster: String,
    #[serde(default)]
    pub loaded_annotation: Option<String>,
    #[serde(default)]
    pub subsample_threshold: Option<u32>,
    #[serde(default)]
    pub subsample_annotation: Option<String>,
    #[garde(length(min = 1), dive)]
    pub selections: Vec<Selection>,
}

impl Endpoint for NewUserAnnotation {
    fn endpoint() -> String {
        "/study/{study_name}/user_annotations".to_string()
    }
}

/// Coordinates and cell names of the cluster the annotation is drawn on.
#[derive(Debug, Clone, Default)]
pub struct ClusterArrays {
    pub x: Vec<CellValue>,
    pub y: Vec<CellValue>,
    pub z: Option<Vec<CellValue>>,
    pub cells: Vec<CellValue>,
}

impl NewUserAnnotation {
    /// Builds the annotation and its own copy of the cluster's arrays, labeling
    /// every cell with the selection that contains it.
    #[must_use]
    pub fn build(
        self,
        study_id: Uuid,
        user_id: Uuid,
        cluster_group_id: Uuid,
        arrays: ClusterArrays,
    ) -> (UserAnnotation, Vec<DataArray>) {
        let Self {
            name,
            loaded_annotation,
            selections,
            ..
        } = self;

        let mut values: Vec<String> = selections.iter().map(|s| s.name.trim().to_string()).collect();

        // A cell listed in several selections keeps the first one.
        let mut label_of: HashMap<&str, &str> = HashMap::new();
        for selection in &selections {
            let label = selection.name.trim();
            for cell in selection.cells() {
                label_of.entry(cell).or_insert(label);
            }
        }

        let labels: Vec<CellValue> = arrays
            .cells
            .iter()
            .map(|cell| {
                let label = label_of.get(cell.to_string().as_str()).copied().unwrap_or(UNDEFINED_LABEL);
                CellValue::from(label)
            })
            .collect();

        if labels.iter().any(|l| l.as_text() == Some(UNDEFINED_LABEL)) && !values.iter().any(|v| v == UNDEFINED_LABEL) {
            values.push(UNDEFINED_LABEL.to_string());
        }

        let annotation = UserAnnotation {
            id: Uuid::now_v7(),
            study_id,
            user_id,
            cluster_group_id,
            name: name.trim().to_string(),
            values,
            source_annotation: loaded_annotation,
        };

        let owner = annotation.owner();
        let ClusterArrays { x, y, z, cells } = arrays;

        let mut data_arrays = Vec::new();
        data_arrays.extend(owner.chunked(&ArrayQuery::new("x", ArrayType::Coordinates), x));
        data_arrays.extend(owner.chunked(&ArrayQuery::new("y", ArrayType::Coordinates), y));
        if let Some(z) = z {
            data_arrays.extend(owner.chunked(&ArrayQuery::new("z", ArrayType::Coordinates), z));
        }
        data_arrays.extend(owner.chunked(&ArrayQuery::new(CELLS_ARRAY, ArrayType::Cells), cells));
        data_arrays.extend(owner.chunked(
            &ArrayQuery::new(&annotation.name, ArrayType::Annotations),
            labels,
        ));

        (annotation, data_arrays)
    }
}
