//! Data written at startup. Seeding is idempotent: users and studies that
//! already exist are left untouched, so a persistent store can be re-seeded on
//! every boot.

use std::collections::HashMap;

use anyhow::Context;
use garde::Validate;
use itertools::Itertools;
use scp_core::{
    model::{
        annotation::{AnnotationType, CellValue},
        cluster::{CellAnnotation, ClusterGroup, ClusterType},
        data_array::{ArrayOwner, ArrayQuery, ArrayType, CELLS_ARRAY, DataArray},
        expression::{ExpressionScore, GeneScoreRow, PrecomputedScore},
        file::{DirectoryListing, FileStatus, ListedFile, StudyFile},
        metadata::StudyMetadatum,
        study::{NewStudy, Study, StudyShare, url_safe_name},
    },
    plot::range::DomainRanges,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    Store, Write,
    model::{
        cluster::cluster_owner,
        study::{StudyCreation, fetch_study},
        user::{User, fetch_user_by_email},
    },
};
use crate::server::auth::ApiKey;

#[derive(Deserialize, Validate, Clone, Debug)]
#[garde(allow_unvalidated)]
pub struct SeedUser {
    #[garde(email)]
    pub email: String,
    pub api_key: ApiKey,
}

impl SeedUser {
    /// # Errors
    pub async fn write(self, store: &Store) -> anyhow::Result<User> {
        if let Some(user) = fetch_user_by_email(&self.email, store).await? {
            return Ok(user);
        }

        let user = User {
            id: Uuid::now_v7(),
            email: self.email,
            hashed_api_key: self.api_key.hash().context("failed to hash API key")?,
            daily_download_quota: 0,
            quota_day: None,
        };
        store.insert(&user).await?;

        Ok(user)
    }
}

#[derive(Deserialize, Clone, Debug)]
struct SeedAnnotation {
    name: String,
    #[serde(rename = "type")]
    annotation_type: AnnotationType,
    values: Vec<CellValue>,
}

impl SeedAnnotation {
    fn cell_annotation(&self) -> CellAnnotation {
        let values = match self.annotation_type {
            AnnotationType::Group => self.values.iter().map(ToString::to_string).unique().sorted().collect(),
            AnnotationType::Numeric => Vec::new(),
        };

        CellAnnotation {
            name: self.name.clone(),
            annotation_type: self.annotation_type,
            values,
        }
    }

    fn subsample_key(&self) -> String {
        format!("{}--{}--cluster", self.name, self.annotation_type)
    }
}

#[derive(Deserialize, Clone, Debug)]
struct SeedCluster {
    name: String,
    #[serde(default)]
    cluster_type: ClusterType,
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(default)]
    z: Option<Vec<f64>>,
    cells: Vec<String>,
    #[serde(default)]
    annotations: Vec<SeedAnnotation>,
    #[serde(default)]
    domain_ranges: Option<DomainRanges>,
    #[serde(default)]
    x_axis_label: Option<String>,
    #[serde(default)]
    y_axis_label: Option<String>,
    #[serde(default)]
    z_axis_label: Option<String>,
    /// Point counts at which reduced copies of the arrays are stored.
    #[serde(default)]
    subsample_thresholds: Vec<u32>,
}

fn numbers(values: &[f64]) -> Vec<CellValue> {
    values.iter().copied().map(CellValue::from).collect()
}

/// Evenly spaced indices picking `threshold` of `len` points.
fn stride(len: usize, threshold: usize) -> Vec<usize> {
    (0..threshold).map(|i| i * len / threshold).collect()
}

fn pick<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().filter_map(|&i| values.get(i).cloned()).collect()
}

impl SeedCluster {
    fn arrays(&self, owner: &ArrayOwner, threshold: Option<u32>, key: &str, indices: Option<&[usize]>) -> Vec<DataArray> {
        let select = |values: Vec<CellValue>| match indices {
            Some(indices) => pick(&values, indices),
            None => values,
        };
        let query = |name: &str, array_type| ArrayQuery::new(name, array_type).subsampled(threshold, key);

        let mut arrays = Vec::new();
        arrays.extend(owner.chunked(&query("x", ArrayType::Coordinates), select(numbers(&self.x))));
        arrays.extend(owner.chunked(&query("y", ArrayType::Coordinates), select(numbers(&self.y))));
        if let Some(z) = &self.z {
            arrays.extend(owner.chunked(&query("z", ArrayType::Coordinates), select(numbers(z))));
        }

        let cells = self.cells.iter().map(|c| CellValue::from(c.as_str())).collect();
        arrays.extend(owner.chunked(&query(CELLS_ARRAY, ArrayType::Cells), select(cells)));

        for annotation in &self.annotations {
            arrays.extend(owner.chunked(
                &query(&annotation.name, ArrayType::Annotations),
                select(annotation.values.clone()),
            ));
        }

        arrays
    }

    fn build(self, study_id: Uuid) -> (ClusterGroup, Vec<DataArray>) {
        let cluster = ClusterGroup {
            id: Uuid::now_v7(),
            study_id,
            name: self.name.clone(),
            cluster_type: self.cluster_type,
            cell_annotations: self.annotations.iter().map(SeedAnnotation::cell_annotation).collect(),
            domain_ranges: self.domain_ranges.clone(),
            x_axis_label: self.x_axis_label.clone(),
            y_axis_label: self.y_axis_label.clone(),
            z_axis_label: self.z_axis_label.clone(),
            points: self.cells.len() as u64,
        };

        let owner = cluster_owner(&cluster);
        let mut arrays = self.arrays(&owner, None, "", None);

        for threshold in &self.subsample_thresholds {
            let size = *threshold as usize;
            if size >= self.cells.len() {
                continue;
            }

            let indices = stride(self.cells.len(), size);
            for annotation in &self.annotations {
                arrays.extend(self.arrays(&owner, Some(*threshold), &annotation.subsample_key(), Some(&indices)));
            }
        }

        (cluster, arrays)
    }
}

#[derive(Deserialize, Clone, Debug)]
struct SeedGene {
    name: String,
    scores: HashMap<String, f64>,
}

#[derive(Deserialize, Clone, Debug)]
struct SeedMetadatum {
    name: String,
    #[serde(rename = "type")]
    annotation_type: AnnotationType,
    values: HashMap<String, CellValue>,
}

#[derive(Deserialize, Clone, Debug)]
struct SeedPrecomputedScore {
    name: String,
    clusters: Vec<String>,
    gene_scores: Vec<GeneScoreRow>,
}

#[derive(Deserialize, Clone, Debug)]
struct SeedFile {
    name: String,
    file_type: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    human_data: bool,
    #[serde(default)]
    status: FileStatus,
}

#[derive(Deserialize, Clone, Debug)]
struct SeedDirectory {
    name: String,
    #[serde(default)]
    synced: bool,
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SeedStudy {
    #[serde(flatten)]
    study: NewStudy,
    owner: String,
    #[serde(default)]
    shares: Vec<StudyShare>,
    #[serde(default)]
    clusters: Vec<SeedCluster>,
    #[serde(default)]
    genes: Vec<SeedGene>,
    #[serde(default)]
    metadata: Vec<SeedMetadatum>,
    #[serde(default)]
    precomputed_scores: Vec<SeedPrecomputedScore>,
    #[serde(default)]
    files: Vec<SeedFile>,
    #[serde(default)]
    directories: Vec<SeedDirectory>,
}

impl SeedStudy {
    async fn write(self, store: &Store) -> anyhow::Result<()> {
        let slug = url_safe_name(&self.study.name);
        if fetch_study(&slug, store).await.is_ok() {
            tracing::debug!(study = %slug, "study already seeded");
            return Ok(());
        }

        let owner = fetch_user_by_email(&self.owner, store)
            .await?
            .with_context(|| format!("study owner {} is not a seeded user", self.owner))?;

        self.study.validate()?;

        let Self {
            study,
            shares,
            clusters,
            genes,
            metadata,
            precomputed_scores,
            files,
            directories,
            ..
        } = self;

        let mut study = StudyCreation {
            study,
            user_id: owner.id,
        }
        .write(store)
        .await?;

        let matrix_id = Uuid::now_v7();
        let mut study_files = vec![];
        if !genes.is_empty() {
            study_files.push(StudyFile {
                id: matrix_id,
                study_id: study.id,
                name: "expression_matrix.txt".to_string(),
                file_type: "Expression Matrix".to_string(),
                size: 0,
                human_data: false,
                status: FileStatus::Uploaded,
            });
        }

        study_files.extend(files.into_iter().map(|f| StudyFile {
            id: Uuid::now_v7(),
            study_id: study.id,
            name: f.name,
            file_type: f.file_type,
            size: f.size,
            human_data: f.human_data,
            status: f.status,
        }));
        store.insert_many(&study_files).await?;

        let mut cell_count = 0;
        for cluster in clusters {
            let (cluster, arrays) = cluster.build(study.id);
            cell_count = cell_count.max(cluster.points);

            store.insert(&cluster).await?;
            store.insert_many(&arrays).await?;
        }

        let scores = genes
            .into_iter()
            .map(|g| ExpressionScore::new(study.id, matrix_id, &g.name, g.scores))
            .collect_vec();
        store.insert_many(&scores).await?;

        let metadata = metadata
            .into_iter()
            .map(|m| StudyMetadatum::new(study.id, &m.name, m.annotation_type, m.values))
            .collect_vec();
        store.insert_many(&metadata).await?;

        let precomputed_scores = precomputed_scores
            .into_iter()
            .map(|p| PrecomputedScore {
                id: Uuid::now_v7(),
                study_id: study.id,
                name: p.name,
                clusters: p.clusters,
                gene_scores: p.gene_scores,
            })
            .collect_vec();
        store.insert_many(&precomputed_scores).await?;

        let directories = directories
            .into_iter()
            .map(|d| DirectoryListing {
                id: Uuid::now_v7(),
                study_id: study.id,
                name: d.name,
                synced: d.synced,
                files: d.files,
            })
            .collect_vec();
        store.insert_many(&directories).await?;

        study.shares = shares;
        if study.cell_count == 0 {
            study.cell_count = cell_count;
        }
        study.initialized = true;
        store.replace(&study).await?;

        tracing::info!(study = %study.url_safe_name, "seeded study");

        Ok(())
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct SeedData {
    #[serde(default)]
    users: Vec<SeedUser>,
    #[serde(default)]
    studies: Vec<SeedStudy>,
}

impl SeedData {
    /// # Errors
    pub async fn write(self, store: &Store) -> anyhow::Result<()> {
        let Self { users, studies } = self;

        for user in users {
            user.validate()?;
            user.write(store).await.context("failed to insert seed user")?;
        }

        for study in studies {
            let name = study.study.name.clone();
            study
                .write(store)
                .await
                .with_context(|| format!("failed to insert seed study {name}"))?;
        }

        Ok(())
    }
}
