//! Signed-URL downloads, one at a time through a redirect or in bulk as a
//! `curl -K` config authorized by a one-time token.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use scp_core::{
    curl::{CurlEntry, curl_config},
    model::{
        file::{ALL_FILES, Download, downloadable_files},
        study::Study,
    },
};
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use super::{
    context::viewable_study,
    error::{Error, Result},
    handler::QueryParams,
};
use crate::{
    db::{
        Store,
        model::{
            file::{fetch_directories, fetch_file, fetch_files},
            totat::{Totat, find_totat, redeem_totat},
            user::{QuotaCheck, User, fetch_user, record_download},
        },
    },
    server::{AppState, auth::SignedIn},
    storage::UrlSigner,
};

const SIGNED_URL_LIFETIME_MINUTES: i64 = 15;
/// `curl -K` fetches files one after another, so bulk URLs must outlast the whole run.
const BULK_SIGNED_URL_LIFETIME_HOURS: i64 = 24;
const TOTAT_LIFETIME_SECONDS: i64 = 1800;

fn ensure_downloads_enabled(app_state: &AppState) -> Result<()> {
    if app_state.config().downloads_enabled() {
        Ok(())
    } else {
        Err(Error::Unavailable {
            message: "downloads are temporarily disabled".to_string(),
        })
    }
}

fn ensure_not_embargoed(study: &Study, user: &User) -> Result<()> {
    if study.embargoed(Some(&user.viewer()), Utc::now().date_naive()) {
        return Err(Error::permission(format!(
            "{} is under embargo and cannot be downloaded yet",
            study.name
        )));
    }

    Ok(())
}

fn quota_error(check: QuotaCheck, requested: u64) -> Error {
    let message = match check {
        QuotaCheck::Fits(limit) => {
            format!("downloading {requested} bytes would exceed the daily quota of {limit} bytes")
        }
        QuotaCheck::Remaining(limit) => format!("the daily quota of {limit} bytes has been used"),
    };

    Error::Quota { message }
}

/// Charges `bytes` against the stored daily usage, refusing the download when
/// `check` fails.
async fn charge_download(user: &User, bytes: u64, check: QuotaCheck, store: &Store) -> Result<u64> {
    record_download(&user.id, bytes, check, Utc::now().date_naive(), store)
        .await?
        .ok_or_else(|| quota_error(check, bytes))
}

/// Files are stored in a bucket named for the study's accession.
fn bucket(study: &Study) -> &str {
    study.accession.as_deref().unwrap_or(&study.url_safe_name)
}

pub(super) async fn download_file(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
    Path((study_name, filename)): Path<(String, String)>,
) -> Result<Redirect> {
    ensure_downloads_enabled(&app_state)?;

    let store = app_state.store();
    let study = viewable_study(&study_name, Some(&user.viewer()), store).await?;
    ensure_not_embargoed(&study, &user)?;

    let file = fetch_file(&study.id, &filename, store)
        .await?
        .filter(|f| f.is_downloadable())
        .ok_or_else(|| Error::not_found(format!("file {filename}")))?;

    let check = QuotaCheck::Fits(app_state.config().download_quota());
    charge_download(&user, file.size, check, store).await?;

    let url = app_state
        .signer()
        .sign(bucket(&study), &file.name, Duration::minutes(SIGNED_URL_LIFETIME_MINUTES))
        .await?;

    tracing::info!(study = %study.url_safe_name, file = %file.name, size = file.size, "signed download");

    Ok(Redirect::to(&url))
}

#[derive(Debug, Serialize)]
pub(super) struct TotatResponse {
    totat: String,
    time_interval: i64,
    expires_at: DateTime<Utc>,
}

pub(super) async fn create_totat(
    SignedIn(user): SignedIn,
    State(app_state): State<AppState>,
) -> Result<(StatusCode, Json<TotatResponse>)> {
    let totat = Totat::new(user.id, Utc::now(), Duration::seconds(TOTAT_LIFETIME_SECONDS));
    app_state.store().insert(&totat).await?;

    Ok((
        StatusCode::CREATED,
        Json(TotatResponse {
            totat: totat.token,
            time_interval: TOTAT_LIFETIME_SECONDS,
            expires_at: totat.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize, Valuable)]
pub(super) struct BulkDownloadQuery {
    auth_code: String,
    #[serde(default = "all_files")]
    download_object: String,
}

fn all_files() -> String {
    ALL_FILES.to_string()
}

async fn sign_all(signer: &UrlSigner, bucket: &str, downloads: Vec<Download>, concurrency: usize) -> Vec<CurlEntry> {
    let expires_in = Duration::hours(BULK_SIGNED_URL_LIFETIME_HOURS);

    let mut signed: Vec<(usize, CurlEntry)> = stream::iter(downloads.into_iter().enumerate())
        .map(|(index, download)| async move {
            let entry = match signer.sign(bucket, &download.name, expires_in).await {
                Ok(url) => CurlEntry::Signed {
                    url,
                    output: download.output,
                },
                Err(error) => {
                    tracing::warn!(file = %download.name, %error, "could not sign download");
                    CurlEntry::Failed { name: download.name }
                }
            };
            (index, entry)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    signed.sort_by_key(|(index, _)| *index);

    signed.into_iter().map(|(_, entry)| entry).collect()
}

fn invalid_token() -> Error {
    Error::permission("the download token is invalid or has expired")
}

/// Renders a `curl -K` config for every file selected by `download_object`.
/// Files that cannot be signed become comments instead of failing the request.
pub(super) async fn download_bulk_files(
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<BulkDownloadQuery>,
) -> Result<Response> {
    tracing::debug!(deserialized_query = query.as_value());

    ensure_downloads_enabled(&app_state)?;

    let store = app_state.store();
    // The token carries no study permissions, so only public studies qualify.
    let study = viewable_study(&study_name, None, store).await?;

    // Refusals happen before the token is consumed, so the user can retry with it.
    let totat = find_totat(&query.auth_code, Utc::now(), store)
        .await?
        .ok_or_else(invalid_token)?;
    let user = fetch_user(&totat.user_id, store).await?;
    ensure_not_embargoed(&study, &user)?;

    let limit = app_state.config().download_quota();
    let check = QuotaCheck::Remaining(limit);
    if user.downloaded_on(Utc::now().date_naive()) >= limit {
        return Err(quota_error(check, 0));
    }

    let files = fetch_files(&study.id, store).await?;
    let directories = fetch_directories(&study.id, store).await?;
    let downloads = downloadable_files(bucket(&study), &files, &directories, &query.download_object);
    let total: u64 = downloads.iter().map(|d| d.size).sum();

    redeem_totat(&query.auth_code, Utc::now(), store)
        .await?
        .ok_or_else(invalid_token)?;
    charge_download(&user, total, check, store).await?;

    let entries = sign_all(
        app_state.signer(),
        bucket(&study),
        downloads,
        app_state.config().download_concurrency(),
    )
    .await;

    tracing::info!(study = %study.url_safe_name, files = entries.len(), bytes = total, "rendered bulk download");

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], curl_config(&entries)).into_response())
}
