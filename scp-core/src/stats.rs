use std::collections::HashMap;

#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let len = values.len() as f64;

    values.iter().sum::<f64>() / len
}

/// Median of an unsorted slice. Even-length input averages the two middle values.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mu = mean(values);
    let squares: Vec<f64> = values.iter().map(|v| (v - mu).powi(2)).collect();

    mean(&squares).sqrt()
}

fn scores_for_cells(scores: &HashMap<String, f64>, cells: &[String]) -> Vec<f64> {
    cells
        .iter()
        .map(|cell| scores.get(cell).copied().unwrap_or_default())
        .collect()
}

/// Row-centers a gene's scores over `cells`. A row with no spread centers to zeros.
#[must_use]
pub fn z_score(scores: &HashMap<String, f64>, cells: &[String]) -> Vec<f64> {
    let values = scores_for_cells(scores, cells);
    let mu = mean(&values);
    let sigma = std_dev(&values);

    values
        .iter()
        .map(|v| if sigma == 0.0 { 0.0 } else { (v - mu) / sigma })
        .collect()
}

/// Like [`z_score`], but centered on the median and scaled by the median absolute deviation.
#[must_use]
pub fn robust_z_score(scores: &HashMap<String, f64>, cells: &[String]) -> Vec<f64> {
    let values = scores_for_cells(scores, cells);
    let center = median(&values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&deviations);

    values
        .iter()
        .map(|v| if mad == 0.0 { 0.0 } else { (v - center) / mad })
        .collect()
}
