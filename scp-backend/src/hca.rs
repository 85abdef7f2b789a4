//! Fetches HCA metadata schemas, keeping a copy of each on local disk.

use camino::{Utf8Path, Utf8PathBuf};
use scp_core::hca::{SchemaSet, external_refs};
use serde::Serialize;
use serde_json::Value;
use valuable::Valuable;

/// Schemas are resolved transitively; this bounds runaway reference chains.
const MAX_SCHEMAS: usize = 256;

#[derive(thiserror::Error, Debug, Clone, Serialize, Valuable, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("invalid schema name {name}")]
    InvalidName { name: String },
    #[error("failed to retrieve schema {entity}: {message}")]
    Fetch { entity: String, message: String },
    #[error("failed to parse schema {entity}: {message}")]
    Parse { entity: String, message: String },
    #[error("failed to cache schema {entity}: {message}")]
    Cache { entity: String, message: String },
}

#[derive(Clone, Debug)]
pub struct SchemaCache {
    root: Utf8PathBuf,
    base_url: String,
    client: reqwest::Client,
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != ".."
        && segment != "."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn check_name(name: &str) -> Result<(), Error> {
    if name.split('/').all(is_safe_segment) {
        Ok(())
    } else {
        Err(Error::InvalidName { name: name.to_string() })
    }
}

/// The entity path of a reference, relative to the schema root and without a
/// `.json` suffix.
fn entity_of(reference: &str) -> String {
    let path = match url::Url::parse(reference) {
        Ok(url) => url.path().trim_start_matches('/').to_string(),
        Err(_) => reference.trim_start_matches("./").to_string(),
    };

    path.strip_suffix(".json").unwrap_or(&path).to_string()
}

fn parse(body: &str, entity: &str) -> Result<Value, Error> {
    serde_json::from_str(body).map_err(|err| Error::Parse {
        entity: entity.to_string(),
        message: err.to_string(),
    })
}

impl SchemaCache {
    #[must_use]
    pub fn new(root: Utf8PathBuf, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    #[must_use]
    pub fn path(&self, version: &str, entity: &str) -> Utf8PathBuf {
        self.root.join(version).join(format!("{entity}.json"))
    }

    #[must_use]
    pub fn url(&self, version: &str, entity: &str) -> String {
        format!("{}/{version}/json_schema/{entity}.json", self.base_url)
    }

    async fn read_local(path: &Utf8Path, entity: &str) -> Result<Option<String>, Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Cache {
                entity: entity.to_string(),
                message: err.to_string(),
            }),
        }
    }

    async fn fetch_remote(&self, url: &str, entity: &str) -> Result<String, Error> {
        let fetch_err = |err: reqwest::Error| Error::Fetch {
            entity: entity.to_string(),
            message: err.to_string(),
        };

        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_err)?
            .text()
            .await
            .map_err(fetch_err)
    }

    async fn write_local(path: &Utf8Path, body: &str, entity: &str) -> Result<(), Error> {
        let cache_err = |err: std::io::Error| Error::Cache {
            entity: entity.to_string(),
            message: err.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(cache_err)?;
        }

        // Readers only ever see a complete file.
        let temp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::now_v7()));
        tokio::fs::write(&temp, body).await.map_err(cache_err)?;
        if let Err(err) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(cache_err(err));
        }

        Ok(())
    }

    /// Loads the schema of `entity` at `version`, using the local copy when one exists.
    ///
    /// # Errors
    pub async fn schema(&self, version: &str, entity: &str) -> Result<Value, Error> {
        self.load(version, entity, &self.url(version, entity)).await
    }

    async fn load(&self, version: &str, entity: &str, url: &str) -> Result<Value, Error> {
        check_name(version)?;
        check_name(entity)?;

        let path = self.path(version, entity);

        let body = match Self::read_local(&path, entity).await? {
            Some(body) => body,
            None => {
                tracing::info!(%path, "saving new local copy of schema");
                let body = self.fetch_remote(url, entity).await?;
                let schema = parse(&body, entity)?;
                Self::write_local(&path, &body, entity).await?;
                return Ok(schema);
            }
        };

        parse(&body, entity)
    }

    /// Loads every schema `root` refers to, directly or through other schemas.
    ///
    /// # Errors
    pub async fn referenced_schemas(&self, version: &str, root: &Value) -> Result<SchemaSet, Error> {
        let mut schemas = SchemaSet::new();
        let mut pending = external_refs(root);

        while let Some(reference) = pending.pop() {
            if schemas.contains_key(&reference) || schemas.len() >= MAX_SCHEMAS {
                continue;
            }

            let entity = entity_of(&reference);
            let url = if reference.starts_with("http://") || reference.starts_with("https://") {
                reference.clone()
            } else {
                self.url(version, &entity)
            };

            let schema = self.load(version, &entity, &url).await?;
            pending.extend(external_refs(&schema));
            schemas.insert(reference, schema);
        }

        Ok(schemas)
    }
}
