use std::{fmt::Debug, str::FromStr};

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::StatusCode,
    response::IntoResponse,
};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use super::AppState;
use crate::db::{
    self,
    model::user::{User, fetch_user, fetch_users_by_key_prefix},
};

const KEY_PREFIX_LENGTH: usize = 8;
const KEY_LENGTH: usize = 32;
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Deserialize, Serialize, Clone)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix(&self) -> &str {
        let Self(key) = self;

        key.get(..KEY_PREFIX_LENGTH).unwrap_or(key)
    }

    /// # Errors
    pub fn hash(&self) -> Result<HashedApiKey, argon2::password_hash::Error> {
        let Self(key) = self;

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(key.as_bytes(), &salt)?.to_string();

        Ok(HashedApiKey {
            prefix: self.prefix().to_string(),
            hash,
        })
    }

    fn is_same_hash(&self, other: &HashedApiKey) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&other.hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(self.as_str().as_bytes(), &parsed_hash)
            .is_ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        let Self(inner) = self;

        inner
    }
}

impl FromStr for ApiKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        let key = rand::rng()
            .sample_iter(Alphanumeric)
            .take(KEY_LENGTH)
            .map(char::from)
            .collect();

        Self(key)
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&self.prefix()).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Valuable)]
pub struct HashedApiKey {
    prefix: String,
    hash: String,
}

async fn fetch_by_api_key(api_key: &ApiKey, store: &db::Store) -> db::error::Result<User> {
    let candidates = fetch_users_by_key_prefix(api_key.prefix(), store).await?;

    candidates
        .into_iter()
        .find(|user| api_key.is_same_hash(&user.hashed_api_key))
        .ok_or(db::error::Error::RecordNotFound)
}

/// The user identified by the request's API key.
#[derive(Debug, Clone)]
pub struct SignedIn(pub User);

impl FromRequestParts<AppState> for SignedIn {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let store = app_state.store();

        if let AppState::Dev { user_id, .. } = app_state {
            return Ok(Self(fetch_user(user_id, store).await?));
        }

        let Some(Ok(api_key)) = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::parse::<ApiKey>)
        else {
            return Err(Error::InvalidApiKey);
        };

        Ok(Self(fetch_by_api_key(&api_key, store).await?))
    }
}

impl OptionalFromRequestParts<AppState> for SignedIn {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(<SignedIn as FromRequestParts<_>>::from_request_parts(parts, state)
            .await
            .ok())
    }
}

#[derive(thiserror::Error, Serialize, Debug, Clone, Valuable)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("invalid API key")]
    InvalidApiKey,
    #[error(transparent)]
    Other(db::error::Error),
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        use db::error::Error::RecordNotFound;

        match err {
            RecordNotFound => Self::InvalidApiKey,
            _ => Self::Other(err),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(auth_error = self.as_value());

        #[derive(Serialize)]
        struct ErrorResponse {
            status: u16,
            error: Option<Error>,
        }

        match self {
            Self::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                axum::Json(ErrorResponse {
                    status: StatusCode::UNAUTHORIZED.as_u16(),
                    error: Some(self),
                }),
            )
                .into_response(),
            Self::Other(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(ErrorResponse {
                    status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    error: None,
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn keys_verify_against_their_hash() {
        let key = ApiKey::new();
        let hashed = key.hash().unwrap();

        assert_eq!(hashed.prefix.len(), KEY_PREFIX_LENGTH);
        assert!(key.is_same_hash(&hashed));
        assert!(!ApiKey::new().is_same_hash(&hashed));
    }

    #[test]
    fn short_keys_do_not_panic() {
        let key: ApiKey = "abc".parse().unwrap();

        assert_eq!(key.prefix(), "abc");
    }

    #[tokio::test]
    async fn lookup_by_key() {
        let store = db::Store::memory();
        let key = ApiKey::new();
        let user = User {
            id: uuid::Uuid::now_v7(),
            email: "someone@example.com".to_string(),
            hashed_api_key: key.hash().unwrap(),
            daily_download_quota: 0,
            quota_day: None,
        };
        store.insert(&user).await.unwrap();

        let found = fetch_by_api_key(&key, &store).await.unwrap();
        assert_eq!(found.id, user.id);

        let err = fetch_by_api_key(&ApiKey::new(), &store).await.unwrap_err();
        assert_eq!(err, db::error::Error::RecordNotFound);
    }
}
