use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::annotation::CellValue;

/// Arrays longer than this are split into several chunks ordered by `array_index`.
pub const MAX_ENTRIES: usize = 100_000;

pub const CELLS_ARRAY: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArrayType {
    Coordinates,
    Cells,
    Annotations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearDataType {
    ClusterGroup,
    UserAnnotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    pub id: Uuid,
    pub study_id: Uuid,
    pub linear_data_id: Uuid,
    pub linear_data_type: LinearDataType,
    pub name: String,
    pub array_type: ArrayType,
    pub array_index: u32,
    #[serde(default)]
    pub subsample_threshold: Option<u32>,
    #[serde(default)]
    pub subsample_annotation: Option<String>,
    pub values: Vec<CellValue>,
}

/// Identifies one logical array of a cluster or user annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayQuery {
    pub name: String,
    pub array_type: ArrayType,
    pub subsample_threshold: Option<u32>,
    pub subsample_annotation: Option<String>,
}

impl ArrayQuery {
    #[must_use]
    pub fn new(name: &str, array_type: ArrayType) -> Self {
        Self {
            name: name.to_string(),
            array_type,
            subsample_threshold: None,
            subsample_annotation: None,
        }
    }

    /// Full-resolution arrays ignore the annotation key; subsampled arrays are
    /// stored once per annotation.
    #[must_use]
    pub fn subsampled(mut self, threshold: Option<u32>, annotation: &str) -> Self {
        self.subsample_threshold = threshold;
        self.subsample_annotation = threshold.map(|_| annotation.to_string());

        self
    }

    #[must_use]
    pub fn matches(&self, array: &DataArray) -> bool {
        array.name == self.name
            && array.array_type == self.array_type
            && array.subsample_threshold == self.subsample_threshold
            && (self.subsample_threshold.is_none()
                || array.subsample_annotation == self.subsample_annotation)
    }
}

/// Joins the chunks of one array in `array_index` order.
#[must_use]
pub fn concatenate(arrays: impl IntoIterator<Item = DataArray>, query: &ArrayQuery) -> Vec<CellValue> {
    let mut chunks: Vec<DataArray> = arrays.into_iter().filter(|a| query.matches(a)).collect();
    chunks.sort_by_key(|a| a.array_index);

    chunks.into_iter().flat_map(|a| a.values).collect()
}

#[must_use]
pub fn numeric(values: Vec<CellValue>) -> Vec<f64> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or_default())
        .collect()
}

#[must_use]
pub fn text(values: Vec<CellValue>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

/// Owner of a set of arrays, used to stamp new chunks.
#[derive(Debug, Clone, Copy)]
pub struct ArrayOwner {
    pub study_id: Uuid,
    pub linear_data_id: Uuid,
    pub linear_data_type: LinearDataType,
}

impl ArrayOwner {
    /// Splits `values` into chunks of at most [`MAX_ENTRIES`].
    #[must_use]
    pub fn chunked(&self, query: &ArrayQuery, values: Vec<CellValue>) -> Vec<DataArray> {
        let mut arrays = Vec::new();
        let mut values = values.into_iter().peekable();
        let mut array_index = 0;

        while values.peek().is_some() {
            let chunk: Vec<CellValue> = values.by_ref().take(MAX_ENTRIES).collect();
            arrays.push(DataArray {
                id: Uuid::now_v7(),
                study_id: self.study_id,
                linear_data_id: self.linear_data_id,
                linear_data_type: self.linear_data_type,
                name: query.name.clone(),
                array_type: query.array_type,
                array_index,
                subsample_threshold: query.subsample_threshold,
                subsample_annotation: query.subsample_annotation.clone(),
                values: chunk,
            });
            array_index += 1;
        }

        arrays
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn owner() -> ArrayOwner {
        ArrayOwner {
            study_id: Uuid::nil(),
            linear_data_id: Uuid::nil(),
            linear_data_type: LinearDataType::ClusterGroup,
        }
    }

    #[test]
    fn concatenates_in_index_order() {
        let query = ArrayQuery::new("x", ArrayType::Coordinates);
        let mut arrays = owner().chunked(&query, vec![1.0.into(), 2.0.into()]);
        arrays.extend(owner().chunked(&ArrayQuery::new("y", ArrayType::Coordinates), vec![9.0.into()]));

        let mut second = arrays[0].clone();
        second.array_index = 1;
        second.values = vec![3.0.into()];
        arrays.insert(0, second);

        assert_eq!(numeric(concatenate(arrays, &query)), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn subsampled_arrays_are_separate() {
        let full = ArrayQuery::new("x", ArrayType::Coordinates);
        let sampled = full.clone().subsampled(Some(1000), "Cluster--group--cluster");
        let other_annotation = full.clone().subsampled(Some(1000), "Age--numeric--study");

        let mut arrays = owner().chunked(&full, vec![1.0.into()]);
        arrays.extend(owner().chunked(&sampled, vec![2.0.into()]));

        assert_eq!(numeric(concatenate(arrays.clone(), &full)), vec![1.0]);
        assert_eq!(numeric(concatenate(arrays.clone(), &sampled)), vec![2.0]);
        assert!(concatenate(arrays, &other_annotation).is_empty());
    }

    #[test]
    fn chunks_long_arrays() {
        let query = ArrayQuery::new("text", ArrayType::Cells);
        let values: Vec<CellValue> = (0..MAX_ENTRIES + 5).map(|i| CellValue::Text(format!("c{i}"))).collect();

        let arrays = owner().chunked(&query, values);

        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[1].array_index, 1);
        assert_eq!(arrays[1].values.len(), 5);
    }
}
