//! Document backend: MongoDB.
//!
//! Records are stored as-is in an `estates` collection, one document per
//! listing, keyed by `hash_id` under a unique index. The upsert is a
//! `replace_one` with `upsert(true)`, so re-delivering a record refreshes
//! the stored document instead of duplicating it.

use mongodb::bson::{Bson, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info};

use super::{StorageBackend, StoreError, UpsertOutcome};
use crate::record::Record;

const COLLECTION: &str = "estates";

/// MongoDB storage backend.
#[derive(Debug)]
pub struct MongoStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connects, verifies the server is reachable and ensures the unique
    /// index on `hash_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Mongo`] if the server cannot be reached or the
    /// index cannot be created - fatal at startup.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);

        // The driver connects lazily; ping now so a bad URI fails the run
        // at startup instead of on the first record.
        db.run_command(doc! { "ping": 1 }).await?;

        let collection = db.collection::<Document>(COLLECTION);
        collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "hash_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        info!(database, collection = COLLECTION, "mongodb ready");
        Ok(Self { client, collection })
    }

    fn to_document(record: &Record, hash_id: i64) -> Result<Document, StoreError> {
        let mut document = Document::new();
        for (name, value) in record.iter() {
            document.insert(name.clone(), mongodb::bson::to_bson(value)?);
        }
        // Legacy alias kept for consumers that query by `id`
        document.insert("id", Bson::Int64(hash_id));
        Ok(document)
    }
}

#[async_trait::async_trait]
impl StorageBackend for MongoStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let hash_id = record.hash_id().ok_or(StoreError::MissingId)?;
        let document = Self::to_document(record, hash_id)?;

        let result = self
            .collection
            .replace_one(doc! { "hash_id": hash_id }, document)
            .upsert(true)
            .await?;

        if result.upserted_id.is_some() {
            Ok(UpsertOutcome::Inserted)
        } else if result.modified_count > 0 {
            debug!(hash_id, "document refreshed in place");
            Ok(UpsertOutcome::Updated)
        } else {
            // Matched but byte-identical; nothing changed.
            Ok(UpsertOutcome::SkippedDuplicate)
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        // shutdown consumes the client; clones share the same topology
        self.client.clone().shutdown().await;
        Ok(())
    }
}
