use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use camino::Utf8PathBuf;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{Store, model::user::User},
    hca::SchemaCache,
    storage::UrlSigner,
};

mod api;
pub mod auth;

/// # Errors
pub async fn serve(mut config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    initialize_logging(log_dir);

    config
        .read_secrets()
        .context("failed to read secrets directory")?;
    let app_addr = config.app_address();

    let app_state = AppState::new(config)
        .await
        .context("failed to initialize app state")?;
    tracing::info!("initialized app state");

    app_state
        .store()
        .prepare()
        .await
        .context("failed to create database indexes")?;

    app_state
        .write_seed_data()
        .await
        .context("failed to insert seed data")?;
    tracing::info!("inserted seed data");

    let app = app(app_state.clone());

    let listener = TcpListener::bind(&app_addr)
        .await
        .context(format!("failed to listen on {app_addr}"))?;
    tracing::info!("single cell portal listening on {app_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("failed to serve app")?;

    Ok(())
}

fn initialize_logging(log_dir: Option<Utf8PathBuf>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    // A subscriber may already be installed when several servers share a process.
    let result = match log_dir {
        None => {
            let dev_test_log_filter = Targets::new()
                .with_target("scp_backend", Level::DEBUG)
                .with_target("tower_http", Level::TRACE);
            let log_layer = log_layer.pretty().with_filter(dev_test_log_filter);

            tracing_subscriber::registry().with(log_layer).try_init()
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "scp_backend.log");
            let prod_log_filter = Targets::new()
                .with_target("scp_backend", Level::INFO)
                .with_target("tower_http", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

#[derive(Clone)]
pub(crate) enum AppState {
    Dev {
        store: Store,
        user_id: Uuid,
        config: Arc<Config>,
        schemas: SchemaCache,
        signer: UrlSigner,
    },
    Prod {
        store: Store,
        config: Arc<Config>,
        schemas: SchemaCache,
        signer: UrlSigner,
    },
}

impl AppState {
    async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::new();

        let store = Store::connect(config.db_url(), config.db_name())
            .await
            .context("failed to connect to database")?;

        let schemas = SchemaCache::new(
            config.schema_cache_dir().clone(),
            config.schema_base_url(),
            http_client.clone(),
        );

        let signer = UrlSigner::new(
            config.signer_url(),
            config.storage_base_url(),
            config.signer_token(),
            http_client.clone(),
        )
        .context("failed to configure URL signer")?;

        let config = Arc::new(config);

        let state = if config.is_dev() {
            let user_id = create_dev_user(&store).await?;

            Self::Dev {
                store,
                user_id,
                config,
                schemas,
                signer,
            }
        } else {
            Self::Prod {
                store,
                config,
                schemas,
                signer,
            }
        };

        Ok(state)
    }

    pub(crate) fn store(&self) -> &Store {
        match self {
            Self::Dev { store, .. } | Self::Prod { store, .. } => store,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        match self {
            Self::Dev { config, .. } | Self::Prod { config, .. } => config,
        }
    }

    pub(crate) fn schemas(&self) -> &SchemaCache {
        match self {
            Self::Dev { schemas, .. } | Self::Prod { schemas, .. } => schemas,
        }
    }

    pub(crate) fn signer(&self) -> &UrlSigner {
        match self {
            Self::Dev { signer, .. } | Self::Prod { signer, .. } => signer,
        }
    }

    async fn write_seed_data(&self) -> anyhow::Result<()> {
        let seed_data = self.config().seed_data()?;

        seed_data.write(self.store()).await
    }
}

async fn create_dev_user(store: &Store) -> anyhow::Result<Uuid> {
    let api_key = auth::ApiKey::new();
    let user = User {
        id: Uuid::now_v7(),
        email: format!("dev-{}@localhost", Uuid::now_v7().simple()),
        hashed_api_key: api_key.hash().context("failed to hash dev API key")?,
        daily_download_quota: 0,
        quota_day: None,
    };

    store.insert(&user).await.context("failed to create dev user")?;
    tracing::info!(email = %user.email, "created development user");

    Ok(user.id)
}

pub(crate) fn app(app_state: AppState) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .route("/health", get(async || ()))
        .with_state(app_state)
}

async fn shutdown_signal(app_state: AppState) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => drop(app_state),
        () = terminate => drop(app_state),
    }
}
