//! Document storage. Records are kept as BSON documents either in MongoDB or,
//! for development and tests, in process memory. Both backends support the
//! same filters (equality plus `$ne`, `$lt` and `$lte`), so callers do not
//! care which one is in use.

use std::sync::Arc;

use bson::{Bson, Document, doc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod error;
mod memory;
pub mod model;
mod mongo;
pub mod seed_data;

use memory::MemoryDb;
use mongo::MongoDb;

/// A type persisted in its own collection.
pub trait Stored: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
    /// Fields whose values must be unique across the collection.
    const UNIQUE: &'static [&'static str] = &["id"];

    fn id(&self) -> Uuid;
}

pub trait Write {
    type Returns;

    async fn write(self, store: &Store) -> error::Result<Self::Returns>;
}

/// Filter value for a uuid, encoded the same way records encode theirs.
pub(crate) fn uuid_filter(id: &Uuid) -> Bson {
    Bson::String(id.to_string())
}

pub(crate) fn by_id(id: &Uuid) -> Document {
    doc! { "id": uuid_filter(id) }
}

pub(crate) fn by_study(study_id: &Uuid) -> Document {
    doc! { "study_id": uuid_filter(study_id) }
}

fn to_document<T: Serialize>(record: &T) -> error::Result<Document> {
    Ok(bson::to_document(record)?)
}

fn from_documents<T: DeserializeOwned>(documents: Vec<Document>) -> error::Result<Vec<T>> {
    documents
        .into_iter()
        .map(|d| bson::from_document(d).map_err(error::Error::from))
        .collect()
}

#[derive(Clone)]
pub enum Store {
    Mongo(MongoDb),
    Memory(Arc<RwLock<MemoryDb>>),
}

impl Store {
    /// # Errors
    pub async fn connect(url: Option<&str>, db_name: &str) -> error::Result<Self> {
        match url {
            Some(url) => Ok(Self::Mongo(MongoDb::connect(url, db_name).await?)),
            None => Ok(Self::memory()),
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryDb::default())))
    }

    /// Creates the unique indexes each collection relies on.
    ///
    /// # Errors
    pub async fn prepare(&self) -> error::Result<()> {
        let Self::Mongo(db) = self else {
            return Ok(());
        };

        for (collection, fields) in model::unique_fields() {
            db.create_unique_indexes(collection, fields).await?;
        }

        Ok(())
    }

    /// # Errors
    pub async fn insert<T: Stored>(&self, record: &T) -> error::Result<()> {
        let document = to_document(record)?;

        match self {
            Self::Mongo(db) => db.insert_many(T::COLLECTION, vec![document]).await,
            Self::Memory(db) => db.write().await.insert_many(T::COLLECTION, T::UNIQUE, vec![document]),
        }
    }

    /// # Errors
    pub async fn insert_many<T: Stored>(&self, records: &[T]) -> error::Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let documents = records.iter().map(to_document).collect::<error::Result<Vec<_>>>()?;

        match self {
            Self::Mongo(db) => db.insert_many(T::COLLECTION, documents).await,
            Self::Memory(db) => db.write().await.insert_many(T::COLLECTION, T::UNIQUE, documents),
        }
    }

    /// # Errors
    pub async fn find<T: Stored>(&self, filter: Document) -> error::Result<Vec<T>> {
        let documents = match self {
            Self::Mongo(db) => db.find(T::COLLECTION, filter).await?,
            Self::Memory(db) => db.read().await.find(T::COLLECTION, &filter),
        };

        from_documents(documents)
    }

    /// # Errors
    pub async fn find_one<T: Stored>(&self, filter: Document) -> error::Result<Option<T>> {
        let document = match self {
            Self::Mongo(db) => db.find_one(T::COLLECTION, filter).await?,
            Self::Memory(db) => db.read().await.find(T::COLLECTION, &filter).into_iter().next(),
        };

        document.map(|d| bson::from_document(d).map_err(error::Error::from)).transpose()
    }

    /// Like [`Store::find_one`], but a missing record is an error.
    ///
    /// # Errors
    pub async fn fetch<T: Stored>(&self, filter: Document) -> error::Result<T> {
        self.find_one(filter).await?.ok_or(error::Error::RecordNotFound)
    }

    /// Replaces the stored record that has the same id.
    ///
    /// # Errors
    pub async fn replace<T: Stored>(&self, record: &T) -> error::Result<()> {
        let filter = by_id(&record.id());
        let document = to_document(record)?;

        match self {
            Self::Mongo(db) => db.replace(T::COLLECTION, filter, document).await,
            Self::Memory(db) => db.write().await.replace(T::COLLECTION, T::UNIQUE, &filter, document),
        }
    }

    /// Removes and returns the first record matching `filter`.
    ///
    /// # Errors
    pub async fn take<T: Stored>(&self, filter: Document) -> error::Result<Option<T>> {
        let document = match self {
            Self::Mongo(db) => db.find_one_and_delete(T::COLLECTION, filter).await?,
            Self::Memory(db) => db.write().await.take(T::COLLECTION, &filter),
        };

        document.map(|d| bson::from_document(d).map_err(error::Error::from)).transpose()
    }

    /// Atomically adds `by` to an integer field, creating the record if needed,
    /// and returns the new value.
    ///
    /// # Errors
    pub async fn increment(&self, collection: &str, filter: Document, field: &str, by: i64) -> error::Result<i64> {
        match self {
            Self::Mongo(db) => db
                .increment(collection, filter, field, by, true)
                .await?
                .ok_or(error::Error::RecordNotFound),
            Self::Memory(db) => Ok(db.write().await.increment(collection, &filter, field, by)),
        }
    }

    /// Atomically adds `by` to an integer field of the first record matching
    /// `filter`. Returns `None`, without inserting, when nothing matches.
    ///
    /// # Errors
    pub async fn increment_existing(
        &self,
        collection: &str,
        filter: Document,
        field: &str,
        by: i64,
    ) -> error::Result<Option<i64>> {
        match self {
            Self::Mongo(db) => db.increment(collection, filter, field, by, false).await,
            Self::Memory(db) => Ok(db.write().await.increment_existing(collection, &filter, field, by)),
        }
    }

    /// Sets `fields` on every record matching `filter` and returns how many matched.
    ///
    /// # Errors
    pub async fn set(&self, collection: &str, filter: Document, fields: Document) -> error::Result<u64> {
        match self {
            Self::Mongo(db) => db.set(collection, filter, fields).await,
            Self::Memory(db) => Ok(db.write().await.set(collection, &filter, &fields)),
        }
    }
}
