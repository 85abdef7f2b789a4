use bson::doc;
use chrono::NaiveDate;
use scp_core::model::study::Viewer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{Store, Stored, error, uuid_filter},
    server::auth::HashedApiKey,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_api_key: HashedApiKey,
    /// Bytes downloaded on `quota_day`.
    #[serde(default)]
    pub daily_download_quota: u64,
    #[serde(default)]
    pub quota_day: Option<NaiveDate>,
}

impl Stored for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE: &'static [&'static str] = &["id", "email"];

    fn id(&self) -> Uuid {
        self.id
    }
}

impl User {
    #[must_use]
    pub fn viewer(&self) -> Viewer {
        Viewer {
            id: self.id,
            email: self.email.clone(),
        }
    }

    /// Usage resets at the start of each day.
    #[must_use]
    pub fn downloaded_on(&self, today: NaiveDate) -> u64 {
        if self.quota_day == Some(today) {
            self.daily_download_quota
        } else {
            0
        }
    }
}

pub async fn fetch_user(id: &Uuid, store: &Store) -> error::Result<User> {
    store.fetch(crate::db::by_id(id)).await
}

pub async fn fetch_users_by_key_prefix(prefix: &str, store: &Store) -> error::Result<Vec<User>> {
    store.find(doc! { "hashed_api_key.prefix": prefix }).await
}

pub async fn fetch_user_by_email(email: &str, store: &Store) -> error::Result<Option<User>> {
    store.find_one(doc! { "email": email }).await
}

/// How much of the daily quota a download may use up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    /// Usage plus the download must stay within the limit.
    Fits(u64),
    /// Usage must be below the limit before the download starts.
    Remaining(u64),
}

/// Atomically adds `bytes` to today's usage if `check` allows it. Returns the
/// new total, or `None` when the quota refuses the download.
pub async fn record_download(
    user_id: &Uuid,
    bytes: u64,
    check: QuotaCheck,
    today: NaiveDate,
    store: &Store,
) -> error::Result<Option<u64>> {
    let id = uuid_filter(user_id);
    let today = today.to_string();

    // Reset usage left over from an earlier day. Concurrent resets match at most once.
    store
        .set(
            User::COLLECTION,
            doc! { "id": id.clone(), "quota_day": { "$ne": today.as_str() } },
            doc! { "quota_day": today.as_str(), "daily_download_quota": 0_i64 },
        )
        .await?;

    let bytes = i64::try_from(bytes).map_err(error::Error::from_other_error)?;
    let limit = match check {
        QuotaCheck::Fits(limit) => doc! { "$lte": i64::try_from(limit).unwrap_or(i64::MAX).saturating_sub(bytes) },
        QuotaCheck::Remaining(limit) => doc! { "$lt": i64::try_from(limit).unwrap_or(i64::MAX) },
    };

    let total = store
        .increment_existing(
            User::COLLECTION,
            doc! { "id": id, "quota_day": today.as_str(), "daily_download_quota": limit },
            "daily_download_quota",
            bytes,
        )
        .await?;

    total.map(|t| u64::try_from(t).map_err(error::Error::from_other_error)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{Days, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::server::auth::ApiKey;

    async fn stored_user(store: &Store, used: u64, quota_day: Option<NaiveDate>) -> User {
        let user = User {
            id: Uuid::now_v7(),
            email: "someone@example.com".to_string(),
            hashed_api_key: ApiKey::new().hash().unwrap(),
            daily_download_quota: used,
            quota_day,
        };
        store.insert(&user).await.unwrap();

        user
    }

    #[tokio::test]
    async fn concurrent_downloads_are_all_counted() {
        let store = Store::memory();
        let today = Utc::now().date_naive();
        let user = stored_user(&store, 0, None).await;

        let (a, b) = tokio::join!(
            record_download(&user.id, 30, QuotaCheck::Fits(100), today, &store),
            record_download(&user.id, 40, QuotaCheck::Fits(100), today, &store),
        );
        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());

        let stored = fetch_user(&user.id, &store).await.unwrap();
        assert_eq!(stored.downloaded_on(today), 70);
    }

    #[tokio::test]
    async fn quota_is_checked_against_stored_usage() {
        let store = Store::memory();
        let today = Utc::now().date_naive();
        let user = stored_user(&store, 90, Some(today)).await;

        let refused = record_download(&user.id, 11, QuotaCheck::Fits(100), today, &store).await.unwrap();
        assert_eq!(refused, None);

        let total = record_download(&user.id, 10, QuotaCheck::Fits(100), today, &store).await.unwrap();
        assert_eq!(total, Some(100));

        let bulk = record_download(&user.id, 500, QuotaCheck::Remaining(100), today, &store).await.unwrap();
        assert_eq!(bulk, None);
    }

    #[tokio::test]
    async fn usage_resets_each_day() {
        let store = Store::memory();
        let today = Utc::now().date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
        let user = stored_user(&store, 100, Some(yesterday)).await;

        let total = record_download(&user.id, 5, QuotaCheck::Remaining(100), today, &store).await.unwrap();
        assert_eq!(total, Some(5));
    }
}
