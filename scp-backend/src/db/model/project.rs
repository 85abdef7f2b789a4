use scp_core::model::project::ProjectMetadatum;
use uuid::Uuid;

use crate::db::{Store, Stored, Write, error};

impl Stored for ProjectMetadatum {
    const COLLECTION: &'static str = "project_metadata";
    const UNIQUE: &'static [&'static str] = &["id", "project_identifier"];

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Write for ProjectMetadatum {
    type Returns = Self;

    async fn write(self, store: &Store) -> error::Result<Self::Returns> {
        store.insert(&self).await?;

        Ok(self)
    }
}
