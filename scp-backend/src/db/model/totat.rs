use bson::doc;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Store, Stored, error};

const TOKEN_LENGTH: usize = 32;

/// A time-based one-time access token, consumed by its first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totat {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Stored for Totat {
    const COLLECTION: &'static str = "totats";
    const UNIQUE: &'static [&'static str] = &["id", "token"];

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Totat {
    #[must_use]
    pub fn new(user_id: Uuid, now: DateTime<Utc>, valid_for: Duration) -> Self {
        let token = rand::rng()
            .sample_iter(Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        Self {
            id: Uuid::now_v7(),
            token,
            user_id,
            expires_at: now + valid_for,
        }
    }
}

/// Looks up an unexpired `token` without consuming it.
pub async fn find_totat(token: &str, now: DateTime<Utc>, store: &Store) -> error::Result<Option<Totat>> {
    let totat: Option<Totat> = store.find_one(doc! { "token": token }).await?;

    Ok(totat.filter(|t| t.expires_at > now))
}

/// Consumes `token`. Expired tokens are consumed too, but yield nothing.
pub async fn redeem_totat(token: &str, now: DateTime<Utc>, store: &Store) -> error::Result<Option<Totat>> {
    let totat: Option<Totat> = store.take(doc! { "token": token }).await?;

    Ok(totat.filter(|t| t.expires_at > now))
}
