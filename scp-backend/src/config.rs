use std::fs;

use anyhow::{Context, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::db::seed_data::SeedData;

/// Daily download allowance in bytes.
pub const DEFAULT_DOWNLOAD_QUOTA: u64 = 2_000_000_000_000;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 100;
pub const DEFAULT_SCHEMA_BASE_URL: &str = "https://raw.githubusercontent.com/HumanCellAtlas/metadata-schema";

#[derive(Args, serde::Deserialize, Clone, Debug)]
pub struct Config {
    #[arg(long, default_value_t)]
    #[serde(default)]
    dev: bool,
    #[arg(long)]
    #[serde(default)]
    secrets_dir: Option<Utf8PathBuf>,
    /// When absent, data is kept in memory for the lifetime of the process
    #[arg(long, env = "SCP_DB_URL")]
    #[serde(default)]
    db_url: Option<String>,
    #[arg(long, env = "SCP_DB_NAME", default_value_t = String::from("single_cell_portal"))]
    #[serde(default = "default_db_name")]
    db_name: String,
    #[arg(long, env = "SCP_BACKEND_HOST", default_value_t = String::from("localhost"))]
    host: String,
    #[arg(long, env = "SCP_BACKEND_PORT", default_value_t = 8000)]
    port: u16,
    #[arg(long, env = "SCP_PORTAL_URL", default_value_t = String::from("http://localhost:8000"))]
    #[serde(default = "default_portal_url")]
    portal_url: String,
    #[arg(long, env = "SCP_SCHEMA_CACHE_DIR", default_value_t = Utf8PathBuf::from("data/HCA_metadata"))]
    #[serde(default = "default_schema_cache_dir")]
    schema_cache_dir: Utf8PathBuf,
    #[arg(long, env = "SCP_SCHEMA_BASE_URL", default_value_t = String::from(DEFAULT_SCHEMA_BASE_URL))]
    #[serde(default = "default_schema_base_url")]
    schema_base_url: String,
    /// Endpoint that signs storage URLs. Without one, URLs are built from `storage_base_url`
    #[arg(long, env = "SCP_SIGNER_URL")]
    #[serde(default)]
    signer_url: Option<String>,
    #[arg(long, env = "SCP_STORAGE_BASE_URL", default_value_t = String::from("http://localhost:8000/storage"))]
    #[serde(default = "default_storage_base_url")]
    storage_base_url: String,
    #[arg(long, env = "SCP_SIGNER_TOKEN", default_value_t)]
    #[serde(default)]
    signer_token: String,
    #[arg(long, env = "SCP_DOWNLOADS_ENABLED", default_value_t = true)]
    #[serde(default = "default_true")]
    downloads_enabled: bool,
    #[arg(long, env = "SCP_DOWNLOAD_QUOTA", default_value_t = DEFAULT_DOWNLOAD_QUOTA)]
    #[serde(default = "default_download_quota")]
    download_quota: u64,
    #[arg(long, env = "SCP_DOWNLOAD_CONCURRENCY", default_value_t = DEFAULT_DOWNLOAD_CONCURRENCY)]
    #[serde(default = "default_download_concurrency")]
    download_concurrency: usize,
    #[arg(skip)]
    #[serde(default)]
    seed_data: Option<SeedData>,
    #[arg(long, env = "SCP_SEED_DATA_PATH")]
    #[serde(default)]
    seed_data_path: Option<Utf8PathBuf>,
}

fn default_db_name() -> String {
    "single_cell_portal".to_string()
}

fn default_portal_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_schema_cache_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("data/HCA_metadata")
}

fn default_schema_base_url() -> String {
    DEFAULT_SCHEMA_BASE_URL.to_string()
}

fn default_storage_base_url() -> String {
    "http://localhost:8000/storage".to_string()
}

fn default_true() -> bool {
    true
}

fn default_download_quota() -> u64 {
    DEFAULT_DOWNLOAD_QUOTA
}

fn default_download_concurrency() -> usize {
    DEFAULT_DOWNLOAD_CONCURRENCY
}

impl Config {
    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.dev
    }

    /// # Errors
    pub fn read_secrets(&mut self) -> anyhow::Result<()> {
        let Self {
            secrets_dir,
            db_url,
            signer_token,
            seed_data,
            seed_data_path,
            ..
        } = self;

        let Some(secrets_dir) = secrets_dir else {
            return Ok(());
        };

        let read_secret = |name: &str| {
            fs::read_to_string(secrets_dir.join(name))
                .map(|s| s.trim().to_string())
                .context(format!("failed to read secret {name}"))
        };

        *db_url = Some(read_secret("db_url")?);
        *signer_token = read_secret("signer_token")?;
        *seed_data = serde_json::from_str(&read_secret("seed_data")?)?;
        *seed_data_path = None;

        Ok(())
    }

    #[must_use]
    pub fn app_address(&self) -> String {
        let Self {
            host: app_host,
            port: app_port,
            ..
        } = self;

        format!("{app_host}:{app_port}")
    }

    #[must_use]
    pub fn db_url(&self) -> Option<&str> {
        self.db_url.as_deref()
    }

    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    #[must_use]
    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    #[must_use]
    pub fn schema_cache_dir(&self) -> &Utf8PathBuf {
        &self.schema_cache_dir
    }

    #[must_use]
    pub fn schema_base_url(&self) -> &str {
        &self.schema_base_url
    }

    #[must_use]
    pub fn signer_url(&self) -> Option<&str> {
        self.signer_url.as_deref()
    }

    #[must_use]
    pub fn storage_base_url(&self) -> &str {
        &self.storage_base_url
    }

    #[must_use]
    pub fn signer_token(&self) -> &str {
        &self.signer_token
    }

    #[must_use]
    pub fn downloads_enabled(&self) -> bool {
        self.downloads_enabled
    }

    #[must_use]
    pub fn download_quota(&self) -> u64 {
        self.download_quota
    }

    #[must_use]
    pub fn download_concurrency(&self) -> usize {
        self.download_concurrency.max(1)
    }

    /// # Errors
    pub fn seed_data(&self) -> anyhow::Result<SeedData> {
        let Self {
            seed_data,
            seed_data_path,
            ..
        } = self;

        match (seed_data, seed_data_path) {
            (Some(seed_data), None) => Ok(seed_data.clone()),
            (None, Some(seed_data_path)) => Ok(serde_json::from_str(&fs::read_to_string(seed_data_path)?)?),
            (Some(_), Some(_)) => bail!("`seed_data` and `seed_data_path` are mutually exclusive"),
            (None, None) => bail!("neither `seed_data` nor `seed_data_path` was supplied"),
        }
    }

    /// A configuration for local development: in-memory store, no seed data
    /// beyond the development user.
    #[must_use]
    pub fn dev(host: String, port: u16) -> Self {
        Self {
            dev: true,
            secrets_dir: None,
            db_url: None,
            db_name: default_db_name(),
            host,
            port,
            portal_url: default_portal_url(),
            schema_cache_dir: default_schema_cache_dir(),
            schema_base_url: default_schema_base_url(),
            signer_url: None,
            storage_base_url: default_storage_base_url(),
            signer_token: String::new(),
            downloads_enabled: true,
            download_quota: DEFAULT_DOWNLOAD_QUOTA,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            seed_data: Some(SeedData::default()),
            seed_data_path: None,
        }
    }
}

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Dev {
        #[arg(long, default_value_t = String::from("localhost"))]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    Prod {
        #[command(flatten)]
        config: Config,
        #[arg(long, env = "SCP_LOG_DIR", default_value_t = Utf8PathBuf::from("/var/log/single_cell_portal"))]
        log_dir: Utf8PathBuf,
        /// TOML file whose values take precedence over flags and environment
        #[arg(long, env = "SCP_CONFIG_FILE")]
        config_file: Option<Utf8PathBuf>,
    },
}

/// # Errors
pub fn read_config_file(path: &Utf8PathBuf) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path).context(format!("failed to read config file {path}"))?;

    toml::from_str(&contents).context(format!("failed to parse config file {path}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn toml_config_defaults() {
        let config: Config = toml::from_str(
            r#"
            host = "0.0.0.0"
            port = 3000
            download_quota = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.app_address(), "0.0.0.0:3000");
        assert_eq!(config.download_quota(), 10);
        assert_eq!(config.db_url(), None);
        assert_eq!(config.schema_base_url(), DEFAULT_SCHEMA_BASE_URL);
        assert!(config.downloads_enabled());
    }

    #[test]
    fn seed_data_sources_are_exclusive() {
        let mut config = Config::dev("localhost".to_string(), 8000);
        config.seed_data_path = Some(Utf8PathBuf::from("seed.json"));

        assert!(config.seed_data().is_err());
    }
}
