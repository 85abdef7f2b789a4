use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database, IndexModel,
    options::{IndexOptions, ReturnDocument},
};

use super::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct MongoDb {
    db: Database,
}

impl MongoDb {
    pub async fn connect(url: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        let db = client.database(db_name);

        db.run_command(doc! { "ping": 1 }).await?;
        tracing::info!(db_name, "connected to MongoDB");

        Ok(Self { db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    pub async fn create_unique_indexes(&self, collection: &str, fields: &[&str]) -> Result<()> {
        let collection = self.collection(collection);

        for field in fields {
            let mut keys = Document::new();
            keys.insert(*field, 1);

            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();

            collection.create_index(index).await?;
        }

        Ok(())
    }

    pub async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        self.collection(collection).insert_many(documents).await?;

        Ok(())
    }

    pub async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        let cursor = self.collection(collection).find(filter).await?;

        Ok(cursor.try_collect().await?)
    }

    pub async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        Ok(self.collection(collection).find_one(filter).await?)
    }

    pub async fn replace(&self, collection: &str, filter: Document, document: Document) -> Result<()> {
        let result = self.collection(collection).replace_one(filter, document).await?;

        if result.matched_count == 0 {
            return Err(Error::RecordNotFound);
        }

        Ok(())
    }

    pub async fn find_one_and_delete(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        Ok(self.collection(collection).find_one_and_delete(filter).await?)
    }

    pub async fn set(&self, collection: &str, filter: Document, fields: Document) -> Result<u64> {
        let result = self
            .collection(collection)
            .update_many(filter, doc! { "$set": fields })
            .await?;

        Ok(result.matched_count)
    }

    pub async fn increment(
        &self,
        collection: &str,
        filter: Document,
        field: &str,
        by: i64,
        upsert: bool,
    ) -> Result<Option<i64>> {
        let mut inc = Document::new();
        inc.insert(field, by);

        let Some(updated) = self
            .collection(collection)
            .find_one_and_update(filter, doc! { "$inc": inc })
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .await?
        else {
            return Ok(None);
        };

        updated
            .get_i64(field)
            .or_else(|_| updated.get_i32(field).map(i64::from))
            .map(Some)
            .map_err(Error::from_other_error)
    }
}
